//! Request instrumentation middleware.
//!
//! Every matched request runs inside a server span named
//! `HTTP <METHOD> <route>`, which becomes the parent of the handler's
//! business span. The request counter and duration histogram are updated
//! once the response is produced.

use crate::state::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::json;
use shared::models::LabelSet;
use std::convert::Infallible;
use std::time::Instant;

/// Counter of handled requests by method, route and status code.
pub const HTTP_REQUESTS_TOTAL: &str = "todoscope_http_requests_total";

/// Histogram of request durations by method, route and status code.
pub const HTTP_REQUEST_DURATION: &str = "todoscope_http_request_duration_seconds";

/// Wraps a matched route with a server span, a request log and HTTP metrics.
pub async fn track_http(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let url = request.uri().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_string(), |p| p.as_str().to_string());

    let span_name = format!("HTTP {method} {route}");
    let attributes = json!({
        "http.method": method,
        "http.route": route,
        "http.target": url,
    });

    let logger = state.http_logger().clone();
    let result = state
        .telemetry()
        .tracer()
        .run_with_span_async(&span_name, attributes, |span| async move {
            if let Err(e) = logger.info(
                "Incoming request",
                json!({
                    "method": request.method().as_str(),
                    "url": request.uri().to_string(),
                    "traceId": span.trace_id(),
                }),
            ) {
                tracing::error!(error = %e, "Failed to emit request log");
            }

            let response = next.run(request).await;
            let status = response.status();
            span.set_attribute("http.status_code", status.as_u16());
            if status.is_server_error() {
                span.set_error(format!("HTTP {}", status.as_u16()));
            }
            Ok::<_, Infallible>(response)
        })
        .await;
    let response = result.unwrap_or_else(|never| match never {});

    let labels = LabelSet::new()
        .with("method", method)
        .with("route", route)
        .with("status_code", response.status().as_u16().to_string());
    let metrics = state.telemetry().metrics();
    if let Err(e) = metrics.increment(HTTP_REQUESTS_TOTAL, &labels) {
        tracing::warn!(error = %e, "Failed to count HTTP request");
    }
    if let Err(e) =
        metrics.record_histogram(HTTP_REQUEST_DURATION, started.elapsed().as_secs_f64(), &labels)
    {
        tracing::warn!(error = %e, "Failed to record HTTP request duration");
    }

    response
}
