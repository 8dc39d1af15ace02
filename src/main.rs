//! Facematch server binary
//!
//! Loads configuration from the environment (and an optional `.env` file)
//! and runs the HTTP server until SIGTERM or Ctrl+C.

use facematch::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load()?;

    facematch::start_server(config).await?;

    Ok(())
}
