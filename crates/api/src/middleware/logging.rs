use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tracing::{error, info, info_span, instrument, Instrument};
use uuid::Uuid;

/// Request/response logging with a per-request id, matching the conventions of the
/// `tower_http::trace` layer this sits alongside rather than duplicating its span machinery.
#[instrument(skip(request, next))]
pub async fn logging_middleware(mut request: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let method = request.method().clone();
    let uri = request.uri().clone();

    if let Ok(header_value) = request_id.parse() {
        request.headers_mut().insert("x-request-id", header_value);
    }

    let span = info_span!("http_request", request_id = %request_id, %method, %uri);
    let response = next.run(request).instrument(span).await;

    let duration = start_time.elapsed();
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        error!(request_id = %request_id, %status, duration_ms = %duration.as_millis(), "request failed");
    } else {
        info!(request_id = %request_id, %status, duration_ms = %duration.as_millis(), "request completed");
    }

    response
}
