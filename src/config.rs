use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whole-request timeout in seconds (outer safety net; the matcher
    /// deadline below is the primary bound)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Directory for transient uploaded images
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Directory of processed artifacts (face crops), served at /static
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Reference image set, served read-only at /bollywood
    #[serde(default = "default_reference_dir")]
    pub reference_dir: PathBuf,

    /// Precomputed embeddings database consumed by the matcher process
    #[serde(default = "default_embeddings_path")]
    pub embeddings_path: PathBuf,

    /// Interpreter (or executable) that runs the matcher
    #[serde(default = "default_matcher_program")]
    pub matcher_program: PathBuf,

    /// Matcher script passed as the program's first argument
    #[serde(default = "default_matcher_script")]
    pub matcher_script: PathBuf,

    /// Hard wall-clock deadline for one matcher invocation, in seconds
    #[serde(default = "default_matcher_timeout_secs")]
    pub matcher_timeout_secs: u64,

    /// Allowed CORS origin; "*" opts into any origin
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,

    /// Skip per-request upload cleanup (debugging aid; the retention sweep
    /// still applies)
    #[serde(default)]
    pub keep_uploads: bool,

    /// Seconds between retention sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Age in seconds after which an orphaned upload is swept
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Environment mode: "development" exposes internal error details
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level filter
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            upload_dir: default_upload_dir(),
            static_dir: default_static_dir(),
            reference_dir: default_reference_dir(),
            embeddings_path: default_embeddings_path(),
            matcher_program: default_matcher_program(),
            matcher_script: default_matcher_script(),
            matcher_timeout_secs: default_matcher_timeout_secs(),
            allowed_origin: default_allowed_origin(),
            keep_uploads: false,
            sweep_interval_secs: default_sweep_interval_secs(),
            retention_secs: default_retention_secs(),
            environment: default_environment(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from an optional `.env` file, an optional
    /// `facematch` config file, and `FACEMATCH__*` environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::with_name("facematch").required(false))
            // Override with environment variables
            .add_source(config::Environment::with_prefix("FACEMATCH").separator("__"));

        let config: ServerConfig = builder.build()?.try_deserialize()?;

        Ok(config)
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Whole-request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Matcher invocation deadline as Duration
    pub fn matcher_deadline(&self) -> Duration {
        Duration::from_secs(self.matcher_timeout_secs)
    }

    /// Interval between retention sweeps
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Retention window for orphaned uploads
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Whether internal error details may be exposed in responses
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_upload_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("api/static")
}

fn default_reference_dir() -> PathBuf {
    PathBuf::from("api/Bollywood_data")
}

fn default_embeddings_path() -> PathBuf {
    PathBuf::from("api/bollywood_embeddings.pkl")
}

fn default_matcher_program() -> PathBuf {
    PathBuf::from("python3")
}

fn default_matcher_script() -> PathBuf {
    PathBuf::from("api/match_face.py")
}

fn default_matcher_timeout_secs() -> u64 {
    30
}

fn default_allowed_origin() -> String {
    "http://localhost:5173".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 5001);
        assert_eq!(cfg.matcher_timeout_secs, 30);
        assert_eq!(cfg.max_upload_bytes, 5 * 1024 * 1024);
        // Outer envelope stays above the matcher deadline so a slow matcher
        // surfaces as TIMEOUT, not as the envelope's 408.
        assert_eq!(cfg.request_timeout_secs, 60);
        assert!(cfg.request_timeout_secs > cfg.matcher_timeout_secs);
        assert_eq!(cfg.allowed_origin, "http://localhost:5173");
        assert_eq!(cfg.sweep_interval_secs, cfg.retention_secs);
        assert!(!cfg.keep_uploads);
        assert!(!cfg.is_development());
    }

    #[test]
    fn test_socket_addr() {
        let cfg = ServerConfig::default();
        let addr = cfg.socket_addr().unwrap();
        assert_eq!(addr.port(), 5001);
    }

    #[test]
    fn test_durations() {
        let cfg = ServerConfig {
            matcher_timeout_secs: 2,
            retention_secs: 10,
            ..Default::default()
        };
        assert_eq!(cfg.matcher_deadline(), Duration::from_secs(2));
        assert_eq!(cfg.retention(), Duration::from_secs(10));
    }
}
