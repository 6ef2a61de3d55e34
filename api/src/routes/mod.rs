//! API route definitions.
//!
//! This module organizes all HTTP routes for the Todoscope API server.

mod health;
mod metrics;
mod spans;
mod todos;

pub use health::health_routes;
pub use metrics::metrics_routes;
pub use spans::spans_routes;
pub use todos::todos_routes;
