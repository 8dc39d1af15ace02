//! Server assembly: router, middleware stack, startup and shutdown.
//!
//! Startup verifies the matcher's inputs and the working directories (fatal
//! on failure), spawns the retention sweeper, and serves until SIGTERM or
//! Ctrl+C; shutdown stops the sweeper after the listener drains.

use crate::config::ServerConfig;
use crate::error::set_expose_internal_details;
use crate::middleware::request_context;
use crate::routes::{self, health, matching};
use crate::state::AppState;
use crate::sweeper::RetentionSweeper;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Multipart framing overhead allowed on top of the file-size ceiling. A
/// body larger than ceiling + overhead is cut off by the body limit; the
/// per-file check in the handler covers everything under it.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the router with all routes and middleware.
///
/// The two file roots are read-only: the reference image set under
/// `/bollywood` and processed artifacts (face crops) under `/static`. The
/// upload store directory is deliberately not served.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(routes::service_info))
        .route("/api/health", get(health::health_check))
        .route("/api/match", post(matching::match_face))
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .nest_service("/bollywood", ServeDir::new(&state.config.reference_dir))
        .fallback(routes::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout(),
        ))
        .layer(cors)
        .layer(from_fn(request_context))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS restricted to the configured origin. `"*"` opts into any origin;
/// an unparseable origin gets a restrictive layer rather than a wide-open
/// one.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.allowed_origin == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    match config.allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any),
        Err(_) => {
            tracing::warn!(
                origin = %config.allowed_origin,
                "allowed_origin is not a valid header value; CORS disabled"
            );
            CorsLayer::new()
        }
    }
}

/// Start the facematch HTTP server. Blocks until shutdown.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.as_str())
        .with_target(false)
        .init();

    set_expose_internal_details(config.is_development());

    let state = AppState::init(config.clone()).await?;
    let sweeper = RetentionSweeper::spawn(
        state.store.clone(),
        config.sweep_interval(),
        config.retention(),
    );

    let app = build_router(state);
    let addr: SocketAddr = config.socket_addr()?;

    tracing::info!(
        %addr,
        matcher_program = %config.matcher_program.display(),
        embeddings = %config.embeddings_path.display(),
        keep_uploads = config.keep_uploads,
        "facematch server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    tracing::info!("server shutdown complete");
    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
