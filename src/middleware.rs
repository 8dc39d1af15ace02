use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

/// Request-context middleware: assigns each request an id (reusing the
/// client's `x-request-id` when present), logs start and completion, and
/// echoes the id on the response.
pub async fn request_context(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = std::time::Instant::now();

    request.extensions_mut().insert(request_id.clone());

    tracing::info!(
        method = %method,
        uri = %uri,
        request_id = %request_id,
        "request started"
    );

    let mut response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = started.elapsed().as_millis() as u64,
        request_id = %request_id,
        "request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}
