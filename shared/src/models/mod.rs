//! Data models for Todoscope.
//!
//! This module contains the todo domain types and the records produced by the
//! telemetry layer: log records, metric samples and completed spans.

pub mod log;
pub mod metric;
pub mod todo;
pub mod trace;

pub use log::{LogLevel, LogRecord, UnknownLogLevel};
pub use metric::{
    HistogramBucket, HistogramSample, LabelSet, MetricKey, MetricKind, MetricsSnapshot,
    ScalarSample,
};
pub use todo::{NewTodo, Todo, TodoPatch, TodoValidationError};
pub use trace::{into_attributes, Attributes, SpanRecord, SpanStatus};
