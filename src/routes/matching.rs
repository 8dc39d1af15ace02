//! The face-match endpoint: multipart intake, validation, storage, matcher
//! invocation, and guaranteed cleanup.
//!
//! One request moves through `Received → Validated → Stored → Matching →
//! Responded → Cleaned`; the [`StoredUpload`](crate::store::StoredUpload)
//! guard makes `Cleaned` the terminal state on every path out of the
//! handler, including errors and panics.

use crate::error::{ServerError, ServerResult};
use crate::matcher::MatchFailure;
use crate::state::AppState;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use bytes::{Bytes, BytesMut};
use serde::Serialize;

/// MIME types accepted for the `image` field.
const ACCEPTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Successful match response
#[derive(Debug, Serialize)]
pub struct MatchResponse {
    /// Matched reference subject
    pub actor: String,

    /// Relative path to the subject's reference image (under /bollywood)
    pub image: String,

    /// Similarity score in [0, 1]
    pub similarity: f64,

    /// Relative path to the cropped submitted face (under /static)
    #[serde(rename = "userFace")]
    pub user_face: String,
}

/// A validated upload, buffered in memory (one file at a time, bounded by
/// the size ceiling).
struct ImageUpload {
    bytes: Bytes,
    filename: String,
}

/// POST /api/match
///
/// Accepts a multipart form with one `image` file (JPEG or PNG, within the
/// configured ceiling), stores it transiently, runs the external matcher
/// under its deadline, and maps the outcome to the wire shape. The upload is
/// removed before the handler returns no matter which branch is taken.
pub async fn match_face(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ServerResult<Json<MatchResponse>> {
    let upload = read_image_field(multipart, state.config.max_upload_bytes).await?;

    let mut stored = state
        .store
        .put(&upload.bytes, &upload.filename)
        .await
        .map_err(ServerError::Storage)?;
    if state.config.keep_uploads {
        stored.keep();
    }

    // From here on, `stored` unlinks the file when this scope ends, whether
    // through the Ok return, the error returns below, or a panic.
    let report = match state.matcher.match_face(stored.path()).await {
        Ok(report) => report,
        Err(MatchFailure::Timeout) => return Err(ServerError::Timeout),
        Err(MatchFailure::Process { detail }) => {
            tracing::error!(detail = %detail, "matcher invocation failed");
            return Err(ServerError::Processing { detail });
        }
    };

    Ok(Json(MatchResponse {
        actor: report.subject,
        image: report.ref_image,
        similarity: report.score,
        user_face: report.face_crop,
    }))
}

/// Find and buffer the `image` field, enforcing the declared-type and size
/// checks while streaming so nothing is stored (or even fully buffered) for
/// a rejected request.
async fn read_image_field(
    mut multipart: Multipart,
    max_bytes: usize,
) -> ServerResult<ImageUpload> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| map_multipart_error(err, max_bytes))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let declared_type = field.content_type().unwrap_or_default().to_string();
        if !ACCEPTED_IMAGE_TYPES.contains(&declared_type.as_str()) {
            return Err(ServerError::InvalidType(declared_type));
        }

        let filename = field.file_name().unwrap_or("upload").to_string();

        let mut buf = BytesMut::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|err| map_multipart_error(err, max_bytes))?
        {
            if buf.len() + chunk.len() > max_bytes {
                return Err(ServerError::TooLarge(max_bytes));
            }
            buf.extend_from_slice(&chunk);
        }

        return Ok(ImageUpload {
            bytes: buf.freeze(),
            filename,
        });
    }

    Err(ServerError::NoFile)
}

/// Body-limit overruns become TOO_LARGE; any other malformed-body problem is
/// the catch-all, since the client sent something we never got far enough to
/// validate.
fn map_multipart_error(err: MultipartError, max_bytes: usize) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::TooLarge(max_bytes)
    } else {
        ServerError::Internal(format!("malformed multipart body: {}", err.body_text()))
    }
}
