//! Prometheus scrape endpoint.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use shared::telemetry::exposition;
use shared::OperationError;

/// Creates the metrics export routes.
pub fn metrics_routes(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(export_metrics))
        .with_state(state)
}

async fn export_metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .telemetry()
        .metrics()
        .render_prometheus()
        .map_err(OperationError::from)?;
    Ok(([(header::CONTENT_TYPE, exposition::content_type())], body))
}
