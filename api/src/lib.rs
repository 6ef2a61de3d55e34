//! Todoscope API Server
//!
//! This crate provides the HTTP server for Todoscope: a todo CRUD service in
//! which every request is traced, logged and measured.
//!
//! # Architecture
//!
//! The API server is built on Axum and Tokio, providing:
//! - REST API for todo CRUD under `/api/todos`
//! - Prometheus exposition at `/metrics`
//! - Recently ended spans at `/debug/spans`
//!
//! # Example
//!
//! ```no_run
//! use api::run_server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_server().await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod error;
mod middleware;
mod routes;
mod state;

pub use config::{Config, SERVICE_NAME};
pub use error::{ApiError, ErrorResponse};
pub use middleware::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION};
pub use state::{AppState, TODOS_ACTIVE, TODOS_COMPLETED, TODO_METRIC_PREFIX};

use anyhow::Result;
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Runs the Todoscope API server.
///
/// This function initializes the server with configuration from environment variables
/// and starts listening for incoming connections. It handles graceful shutdown on
/// SIGTERM/SIGINT signals.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;
    run_server_with_config(config).await
}

/// Runs the Todoscope API server with the provided configuration.
///
/// This is useful for testing or when you want to provide configuration programmatically.
///
/// # Errors
///
/// Returns an error if:
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server_with_config(config: Config) -> Result<()> {
    let addr = config.socket_addr()?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        seed_example = config.seed_example,
        "Todoscope API server starting"
    );

    let state = AppState::from_config(&config);
    let app = create_router(state.clone());
    let listener = TcpListener::bind(addr).await?;

    state.http_logger().info(
        "Server started",
        json!({"port": config.port, "service": config.telemetry.service_name}),
    )?;
    tracing::info!(%addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Creates the main application router with all routes and middleware.
///
/// This function is public to allow testing the router without starting a full server.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes(state.clone()))
        .merge(routes::todos_routes(state.clone()))
        .merge(routes::metrics_routes(state.clone()))
        .merge(routes::spans_routes(state.clone()))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::track_http,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
