//! Todoscope Shared Library
//!
//! This crate contains the todo models and storage used by the API server
//! and the CLI, plus the observability core both tiers are built on.
//!
//! # Modules
//!
//! - [`models`] - Data models for todos, log records, metrics and spans
//! - [`telemetry`] - Structured logger, metrics aggregator and span tracer
//! - [`storage`] - Todo storage trait and in-memory implementation
//! - [`config`] - Telemetry settings
//! - [`error`] - Failure taxonomy for instrumented actions
//!
//! # Example
//!
//! ```
//! use shared::models::LabelSet;
//! use shared::telemetry::{InMemorySpanExporter, MetricsAggregator, SpanTracer};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let exporter = Arc::new(InMemorySpanExporter::new(16));
//! let tracer = SpanTracer::new("todoscope", exporter.clone());
//! let metrics = MetricsAggregator::default();
//!
//! tracer
//!     .run_with_span("add_todo", json!({"todo.text": "milk"}), |_span| {
//!         metrics.increment("todos_added", &LabelSet::new())
//!     })
//!     .unwrap();
//!
//! assert_eq!(exporter.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod telemetry;

pub use error::OperationError;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use validator;
