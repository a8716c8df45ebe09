//! Request timing middleware.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::{Duration, Instant};

/// Requests slower than this are logged as warnings.
const SLOW_REQUEST: Duration = Duration::from_millis(100);

/// Middleware that logs method, path, status and duration of each request.
///
/// Requests above [`SLOW_REQUEST`] are logged at `warn`, everything else at
/// `debug`. Outbound integration calls (video, fax, LLM) usually land here
/// as slow requests.
pub async fn timing_layer(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    let duration_ms = elapsed.as_millis() as u64;

    if elapsed > SLOW_REQUEST {
        tracing::warn!(%method, %path, status, duration_ms, "Slow request");
    } else {
        tracing::debug!(%method, %path, status, duration_ms, "Request completed");
    }

    response
}
