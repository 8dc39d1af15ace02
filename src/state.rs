use crate::config::ServerConfig;
use crate::matcher::{MatcherGateway, ProcessMatcher};
use crate::store::EphemeralStore;
use anyhow::Context;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Transient storage for uploaded images
    pub store: EphemeralStore,

    /// Gateway to the external matcher process
    pub matcher: Arc<dyn MatcherGateway>,
}

impl AppState {
    /// Build state for production: verify the matcher's inputs, create the
    /// working directories, and wire up the subprocess gateway. Failures
    /// here are fatal at startup by design.
    pub async fn init(config: ServerConfig) -> anyhow::Result<Self> {
        let matcher = Arc::new(ProcessMatcher::new(
            &config.matcher_program,
            &config.matcher_script,
            &config.embeddings_path,
            config.matcher_deadline(),
        ));
        Self::new(config, matcher).await
    }

    /// Build state with an explicit gateway (tests substitute stub matchers
    /// here).
    pub async fn new(
        config: ServerConfig,
        matcher: Arc<dyn MatcherGateway>,
    ) -> anyhow::Result<Self> {
        tokio::fs::metadata(&config.embeddings_path)
            .await
            .with_context(|| {
                format!(
                    "embeddings database not accessible: {}",
                    config.embeddings_path.display()
                )
            })?;

        for dir in [&config.upload_dir, &config.static_dir, &config.reference_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create directory: {}", dir.display()))?;
        }

        let store = EphemeralStore::new(&config.upload_dir);

        Ok(Self {
            config: Arc::new(config),
            store,
            matcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_init_fails_without_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            upload_dir: dir.path().join("uploads"),
            static_dir: dir.path().join("static"),
            reference_dir: dir.path().join("reference"),
            embeddings_path: dir.path().join("missing.pkl"),
            ..Default::default()
        };

        assert!(AppState::init(config).await.is_err());
    }

    #[tokio::test]
    async fn test_new_creates_working_directories() {
        let dir = tempfile::tempdir().unwrap();
        let embeddings = dir.path().join("embeddings.pkl");
        tokio::fs::write(&embeddings, b"stub").await.unwrap();

        let config = ServerConfig {
            upload_dir: dir.path().join("uploads"),
            static_dir: dir.path().join("static"),
            reference_dir: dir.path().join("reference"),
            embeddings_path: embeddings,
            ..Default::default()
        };

        let matcher = Arc::new(ProcessMatcher::new(
            "python3",
            "match_face.py",
            "embeddings.pkl",
            Duration::from_secs(30),
        ));
        let state = AppState::new(config, matcher).await.unwrap();

        assert!(state.config.upload_dir.is_dir());
        assert!(state.config.static_dir.is_dir());
        assert!(state.config.reference_dir.is_dir());
        assert_eq!(state.store.dir(), state.config.upload_dir);
    }
}
