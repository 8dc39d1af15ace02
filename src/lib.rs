//! Facematch server - HTTP API for celebrity face matching
//!
//! This crate provides an HTTP server that accepts a user-submitted
//! photograph, hands it to an external facial-similarity matcher process,
//! and returns the best-matching reference subject with a similarity score.
//! Uploaded images are request-scoped: every accepted upload is written to a
//! transient store and removed on every exit path, with a periodic retention
//! sweep catching anything a crash left behind.
//!
//! # API Endpoints
//!
//! - `GET /` - Service information
//! - `GET /api/health` - Health check, reports matcher availability
//! - `POST /api/match` - Multipart upload, field `image` (JPEG or PNG, max 5 MiB)
//! - `GET /static/*` - Processed artifacts (face crops), read-only
//! - `GET /bollywood/*` - Reference image set, read-only
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use facematch::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     facematch::start_server(config).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod matcher;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;
pub mod sweeper;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::AppState;
