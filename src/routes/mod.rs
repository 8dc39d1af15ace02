//! API route handlers
//!
//! - `health`: health check with matcher availability
//! - `matching`: the face-match upload endpoint

pub mod health;
pub mod matching;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Service info for the root endpoint
pub async fn service_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "facematch-server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "POST /api/match",
            "GET /api/health",
            "GET /static/*",
            "GET /bollywood/*"
        ]
    })))
}

/// 404 fallback for undefined routes
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
