//! Observability core: structured logging, metrics aggregation and span
//! management.
//!
//! The three parts are independent; `Telemetry` bundles them for one
//! process and `Instrumented` composes them per business action.

pub mod exporter;
pub mod exposition;
pub mod instrument;
pub mod logger;
pub mod metrics;
pub mod tracer;

pub use exporter::{FanoutExporter, InMemorySpanExporter, LogSpanExporter, SpanExporter};
pub use instrument::{Action, Instrumented};
pub use logger::{LogSink, LogSinkError, Logger, MemorySink, StreamSink, TracingSink};
pub use metrics::{MetricsAggregator, MetricsError};
pub use tracer::{active_span, Span, SpanTracer};

use crate::config::TelemetryConfig;
use crate::models::LogLevel;
use std::sync::Arc;

/// Logger sink, metrics and tracer shared by one process.
#[derive(Clone)]
pub struct Telemetry {
    metrics: Arc<MetricsAggregator>,
    tracer: SpanTracer,
    sink: Arc<dyn LogSink>,
    log_level: LogLevel,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("tracer", &self.tracer)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    /// Creates the telemetry bundle.
    #[must_use]
    pub fn new(
        config: &TelemetryConfig,
        sink: Arc<dyn LogSink>,
        exporter: Arc<dyn SpanExporter>,
    ) -> Self {
        Self {
            metrics: Arc::new(MetricsAggregator::from_config(config)),
            tracer: SpanTracer::new(config.service_name.clone(), exporter),
            sink,
            log_level: config.log_level,
        }
    }

    /// Returns a logger bound to `context` at the configured level.
    #[must_use]
    pub fn logger(&self, context: &str) -> Logger {
        Logger::new(context, Arc::clone(&self.sink)).with_min_level(self.log_level)
    }

    /// Shared metrics aggregator.
    #[must_use]
    pub fn metrics(&self) -> Arc<MetricsAggregator> {
        Arc::clone(&self.metrics)
    }

    /// Tracer for this service.
    #[must_use]
    pub fn tracer(&self) -> &SpanTracer {
        &self.tracer
    }
}
