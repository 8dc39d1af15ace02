//! Retention Sweeper: periodic garbage collection of orphaned uploads.
//!
//! Per-request cleanup already removes uploads on every handler exit path;
//! the sweeper is the safety net for crashes and for `keep_uploads` debug
//! runs. It is a managed background task with explicit start/stop tied to
//! the server lifecycle, not ambient global state.

use crate::store::EphemeralStore;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Handle to the running sweep task. Owned by the server; dropping the
/// handle without calling [`shutdown`](Self::shutdown) leaves the task
/// running until the process exits.
pub struct RetentionSweeper {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl RetentionSweeper {
    /// Spawn the sweep loop: every `interval`, delete store entries older
    /// than `retention`.
    pub fn spawn(store: EphemeralStore, interval: Duration, retention: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            tracing::info!(
                interval_secs = interval.as_secs(),
                retention_secs = retention.as_secs(),
                dir = %store.dir().display(),
                "retention sweeper started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("retention sweeper stopping");
                        break;
                    }
                    _ = sleep(interval) => {
                        sweep_once(&store, retention).await;
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the sweep loop and wait for it to finish. A sweep interrupted
    /// mid-cycle is harmless: deletion is idempotent and the next process
    /// picks up whatever remains.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.handle.await;
    }
}

/// One sweep pass: delete every store entry older than `retention`. A
/// per-file failure is logged by the store and never aborts the pass.
/// Returns the number of stale entries handled.
pub async fn sweep_once(store: &EphemeralStore, retention: Duration) -> usize {
    let stale = match store.list_older_than(retention).await {
        Ok(stale) => stale,
        Err(err) => {
            tracing::error!(error = %err, dir = %store.dir().display(), "retention sweep scan failed");
            return 0;
        }
    };

    let count = stale.len();
    for path in stale {
        store.delete(&path).await;
    }
    if count > 0 {
        tracing::info!(count, "swept stale uploads");
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_removes_only_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = EphemeralStore::new(dir.path());

        let mut stale = store.put(b"old", "old.jpg").await.unwrap();
        stale.keep();
        std::thread::sleep(Duration::from_millis(60));
        let mut fresh = store.put(b"new", "new.jpg").await.unwrap();
        fresh.keep();

        let swept = sweep_once(&store, Duration::from_millis(30)).await;
        assert_eq!(swept, 1);
        assert!(!stale.path().exists());
        assert!(fresh.path().exists());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = EphemeralStore::new(dir.path());

        let mut stored = store.put(b"old", "old.jpg").await.unwrap();
        stored.keep();
        std::thread::sleep(Duration::from_millis(60));

        assert_eq!(sweep_once(&store, Duration::from_millis(10)).await, 1);
        // Second pass with no new files: no errors, nothing deleted.
        assert_eq!(sweep_once(&store, Duration::from_millis(10)).await, 0);
    }

    #[tokio::test]
    async fn test_sweep_survives_missing_directory() {
        let store = EphemeralStore::new("/nonexistent/facematch-sweeper-test");
        assert_eq!(sweep_once(&store, Duration::from_secs(0)).await, 0);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_stops_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let store = EphemeralStore::new(dir.path());

        let sweeper = RetentionSweeper::spawn(
            store,
            Duration::from_millis(10),
            Duration::from_secs(3600),
        );
        sleep(Duration::from_millis(50)).await;
        sweeper.shutdown().await;
    }
}
