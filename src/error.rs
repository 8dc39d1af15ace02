use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};

pub type ServerResult<T> = Result<T, ServerError>;

/// Whether internal error details are put on the wire. Set once at startup
/// from the configured environment mode; error responses are built in
/// `IntoResponse`, which has no access to state.
static EXPOSE_INTERNAL_DETAILS: AtomicBool = AtomicBool::new(false);

pub fn set_expose_internal_details(expose: bool) {
    EXPOSE_INTERNAL_DETAILS.store(expose, Ordering::Relaxed);
}

fn expose_internal_details() -> bool {
    EXPOSE_INTERNAL_DETAILS.load(Ordering::Relaxed)
}

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("No image file uploaded")]
    NoFile,

    #[error("Only JPEG and PNG images are accepted")]
    InvalidType(String),

    #[error("Image exceeds the upload size limit of {0} bytes")]
    TooLarge(usize),

    #[error("Failed to store uploaded image")]
    Storage(#[source] std::io::Error),

    #[error("Face matching failed")]
    Processing { detail: String },

    #[error("Face matching timed out")]
    Timeout,

    #[error("Endpoint not found")]
    NotFound,

    #[error("Internal server error")]
    Internal(String),
}

impl ServerError {
    /// Get HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::NoFile | ServerError::InvalidType(_) => StatusCode::BAD_REQUEST,
            ServerError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Storage(_) | ServerError::Processing { .. } | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::NoFile => "NO_FILE",
            ServerError::InvalidType(_) => "INVALID_TYPE",
            ServerError::TooLarge(_) => "TOO_LARGE",
            ServerError::Storage(_) => "STORAGE_ERROR",
            ServerError::Processing { .. } => "PROCESSING_ERROR",
            ServerError::Timeout => "TIMEOUT",
            ServerError::NotFound => "NOT_FOUND",
            ServerError::Internal(_) => "SERVER_ERROR",
        }
    }

    /// Diagnostic detail for the response body. Matcher diagnostics are
    /// always sent (the client has nothing else to go on); internal and
    /// storage details only leave the process in development mode.
    fn details(&self) -> Option<String> {
        match self {
            ServerError::Processing { detail } => Some(detail.clone()),
            ServerError::InvalidType(declared) if !declared.is_empty() => {
                Some(format!("declared type: {declared}"))
            }
            ServerError::Storage(err) if expose_internal_details() => Some(err.to_string()),
            ServerError::Internal(detail) if expose_internal_details() => Some(detail.clone()),
            _ => None,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(details) = self.details() {
            body["details"] = json!(details);
        }

        (status, Json(body)).into_response()
    }
}

impl From<std::net::AddrParseError> for ServerError {
    fn from(err: std::net::AddrParseError) -> Self {
        ServerError::Internal(format!("Invalid address: {err}"))
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_code_mapping() {
        let cases = [
            (ServerError::NoFile, StatusCode::BAD_REQUEST, "NO_FILE"),
            (
                ServerError::InvalidType("text/plain".into()),
                StatusCode::BAD_REQUEST,
                "INVALID_TYPE",
            ),
            (
                ServerError::TooLarge(5 * 1024 * 1024),
                StatusCode::PAYLOAD_TOO_LARGE,
                "TOO_LARGE",
            ),
            (ServerError::Timeout, StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            (ServerError::NotFound, StatusCode::NOT_FOUND, "NOT_FOUND"),
            (
                ServerError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERVER_ERROR",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status);
            assert_eq!(err.error_code(), code);
        }
    }

    #[test]
    fn test_processing_detail_always_present() {
        let err = ServerError::Processing {
            detail: "stderr text".into(),
        };
        assert_eq!(err.details().as_deref(), Some("stderr text"));
    }
}
