//! Ephemeral Store: request-scoped transient storage for uploaded images.
//!
//! Every accepted upload is written under one dedicated directory with a
//! collision-resistant name, and removed again before the request finishes
//! via the [`StoredUpload`] guard. The retention sweeper uses
//! [`EphemeralStore::list_older_than`] to catch files a crash left behind.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Transient file area for uploaded images. Side effects are confined to the
/// one directory it was constructed with.
#[derive(Debug, Clone)]
pub struct EphemeralStore {
    dir: PathBuf,
}

impl EphemeralStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` to a freshly named file inside the store directory.
    ///
    /// Names combine wall-clock millis with a random suffix, so concurrent
    /// requests never contend on the same path. The client-supplied filename
    /// is sanitized before it becomes part of the name.
    pub async fn put(&self, bytes: &[u8], declared_name: &str) -> io::Result<StoredUpload> {
        let millis = chrono::Utc::now().timestamp_millis();
        let entropy: u32 = rand::random();
        let name = format!("{millis}-{entropy}-{}", sanitize_filename(declared_name));
        let path = self.dir.join(name);

        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "stored uploaded image");

        Ok(StoredUpload { path, keep: false })
    }

    /// Remove a file if present. Idempotent: an already-absent path is not an
    /// error, only logged.
    pub async fn delete(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "removed uploaded image"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "upload already removed");
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove upload");
            }
        }
    }

    /// Enumerate store entries whose last-modified time exceeds `age`.
    /// Used only by the retention sweeper.
    pub async fn list_older_than(&self, age: Duration) -> io::Result<Vec<PathBuf>> {
        let now = SystemTime::now();
        let mut stale = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(err) => {
                    tracing::warn!(path = %entry.path().display(), error = %err, "failed to stat entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            // A file with an unreadable or future mtime counts as fresh.
            let modified = metadata.modified().unwrap_or(now);
            if now.duration_since(modified).unwrap_or_default() > age {
                stale.push(entry.path());
            }
        }

        Ok(stale)
    }
}

/// Scoped acquisition of one stored upload: dropping the guard removes the
/// file, so cleanup runs on every exit path out of the request handler,
/// including early error returns and panics.
#[derive(Debug)]
pub struct StoredUpload {
    path: PathBuf,
    keep: bool,
}

impl StoredUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Defuse cleanup, leaving the file for the retention sweeper (or a
    /// debugging human) to pick up.
    pub fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for StoredUpload {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        // Synchronous unlink keeps Drop infallible; removing one small file
        // does not block the runtime meaningfully.
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "cleaned up uploaded image"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "upload already removed");
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "upload cleanup failed");
            }
        }
    }
}

/// Strip anything path-like from a client-supplied filename, keeping only a
/// conservative character set.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches(['.', '_']).is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, EphemeralStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = EphemeralStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_creates_distinct_paths() {
        let (_dir, store) = temp_store();

        let mut a = store.put(b"jpeg-a", "selfie.jpg").await.unwrap();
        let mut b = store.put(b"jpeg-b", "selfie.jpg").await.unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().exists());
        assert!(b.path().exists());

        a.keep();
        b.keep();
    }

    #[tokio::test]
    async fn test_guard_removes_file_on_drop() {
        let (_dir, store) = temp_store();

        let path = {
            let stored = store.put(b"bytes", "face.png").await.unwrap();
            stored.path().to_path_buf()
        };

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_keep_defuses_cleanup() {
        let (_dir, store) = temp_store();

        let path = {
            let mut stored = store.put(b"bytes", "face.png").await.unwrap();
            stored.keep();
            stored.path().to_path_buf()
        };

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, store) = temp_store();

        let mut stored = store.put(b"bytes", "face.jpg").await.unwrap();
        stored.keep();
        let path = stored.path().to_path_buf();
        drop(stored);

        store.delete(&path).await;
        assert!(!path.exists());
        // Second delete of the same path must not panic or error.
        store.delete(&path).await;
    }

    #[tokio::test]
    async fn test_list_older_than_respects_age() {
        let (_dir, store) = temp_store();

        let mut stored = store.put(b"bytes", "old.jpg").await.unwrap();
        stored.keep();

        std::thread::sleep(Duration::from_millis(60));

        let stale = store.list_older_than(Duration::from_millis(10)).await.unwrap();
        assert_eq!(stale.len(), 1);

        let fresh = store.list_older_than(Duration::from_secs(3600)).await.unwrap();
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("selfie.jpg"), "selfie.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("my photo (1).png"), "my_photo__1_.png");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename("..."), "upload");
    }
}
