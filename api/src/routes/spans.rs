//! Recently ended spans, for local inspection.

use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use shared::models::SpanRecord;

/// Response for the span buffer.
#[derive(Debug, Serialize)]
pub struct SpansResponse {
    /// Number of spans returned.
    pub count: usize,
    /// Spans, oldest first.
    pub spans: Vec<SpanRecord>,
}

/// Creates the span inspection routes.
pub fn spans_routes(state: AppState) -> Router {
    Router::new()
        .route("/debug/spans", get(recent_spans))
        .with_state(state)
}

async fn recent_spans(State(state): State<AppState>) -> Json<SpansResponse> {
    let spans = state.spans().spans();
    Json(SpansResponse {
        count: spans.len(),
        spans,
    })
}
