//! Health check endpoint.
//!
//! Provides a simple health check endpoint for load balancers and monitoring systems.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use shared::OperationError;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status (always "healthy" if reachable).
    pub status: &'static str,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: &'static str,
    /// Time the check ran.
    pub timestamp: DateTime<Utc>,
}

/// Creates the health check routes.
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
}

/// Health check handler.
///
/// Runs inside a `health_check` span so that health checks show up in traces.
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let tracer = state.telemetry().tracer();
    let timestamp = tracer.run_with_span("health_check", Value::Null, |_| {
        state
            .http_logger()
            .info("Health check called", Value::Null)
            .map_err(OperationError::from)?;
        Ok::<_, OperationError>(Utc::now())
    })?;

    Ok(Json(HealthResponse {
        status: "healthy",
        service: tracer.service().to_string(),
        version: env!("CARGO_PKG_VERSION"),
        timestamp,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[test]
    fn test_health_check_status() {
        let app = health_routes(AppState::with_in_memory_store());

        let response = tokio_test::block_on(
            app.oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            ),
        )
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_check_body() {
        let app = health_routes(AppState::with_in_memory_store());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(health["status"], "healthy");
        assert_eq!(health["service"], "todoscope-api");
        assert!(health["version"].is_string());
        assert!(health["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_health_check_records_span() {
        let state = AppState::with_in_memory_store();
        let app = health_routes(state.clone());

        app.oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(state.spans().find("health_check").len(), 1);
    }
}
