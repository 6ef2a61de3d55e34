//! Application state module.
//!
//! Defines the shared application state that is passed to route handlers.

use crate::config::Config;
use shared::config::TelemetryConfig;
use shared::models::LabelSet;
use shared::storage::{InMemoryTodoStore, TodoStats, TodoStore};
use shared::telemetry::{
    FanoutExporter, InMemorySpanExporter, Instrumented, LogSink, LogSpanExporter, Logger,
    MemorySink, SpanExporter, StreamSink, Telemetry,
};
use shared::OperationError;
use std::sync::{Arc, Mutex};

/// Gauge holding the number of todos not yet completed.
pub const TODOS_ACTIVE: &str = "todoscope_todos_active";

/// Gauge holding the number of completed todos.
pub const TODOS_COMPLETED: &str = "todoscope_todos_completed";

/// Prefix of the business operation counter and histogram.
pub const TODO_METRIC_PREFIX: &str = "todoscope_todo";

/// Application state shared across all request handlers.
///
/// Cloning is cheap: every clone shares the same store, metrics and span
/// buffer.
#[derive(Clone)]
pub struct AppState {
    /// The todo storage backend.
    todo_store: Arc<dyn TodoStore>,
    /// Logger sink, metrics and tracer.
    telemetry: Telemetry,
    /// Instrumentation for todo CRUD actions.
    operations: Instrumented,
    /// Recently ended spans.
    spans: Arc<InMemorySpanExporter>,
    /// Logger for request-level events.
    http_logger: Logger,
    /// Store revision the todo gauges were last set from.
    gauge_revision: Arc<Mutex<Option<u64>>>,
}

impl AppState {
    /// Creates a new application state.
    ///
    /// Registers metric descriptions and initializes the todo gauges from the
    /// store contents.
    pub fn new(
        todo_store: Arc<dyn TodoStore>,
        config: &TelemetryConfig,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let spans = Arc::new(InMemorySpanExporter::new(config.span_buffer_capacity));
        let exporter: Arc<dyn SpanExporter> = if config.log_spans {
            Arc::new(
                FanoutExporter::new()
                    .with_exporter(spans.clone())
                    .with_exporter(Arc::new(LogSpanExporter)),
            )
        } else {
            spans.clone()
        };

        let telemetry = Telemetry::new(config, sink, exporter);
        let metrics = telemetry.metrics();
        for (name, help) in [
            (TODOS_ACTIVE, "Number of active todos"),
            (TODOS_COMPLETED, "Number of completed todos"),
            (
                crate::middleware::HTTP_REQUESTS_TOTAL,
                "Total number of HTTP requests",
            ),
            (
                crate::middleware::HTTP_REQUEST_DURATION,
                "HTTP request duration in seconds",
            ),
        ] {
            if let Err(e) = metrics.describe(name, help) {
                tracing::warn!(error = %e, metric = name, "Failed to describe metric");
            }
        }

        let state = Self {
            operations: Instrumented::new(&telemetry, "TodoService", TODO_METRIC_PREFIX),
            http_logger: telemetry.logger("HttpServer"),
            todo_store,
            telemetry,
            spans,
            gauge_revision: Arc::new(Mutex::new(None)),
        };
        if let Err(e) = state.refresh_todo_gauges() {
            tracing::warn!(error = %e, "Failed to initialize todo gauges");
        }
        state
    }

    /// Creates the state for a running server: JSON log lines on
    /// stdout/stderr and an optionally seeded store.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let store: Arc<dyn TodoStore> = if config.seed_example {
            Arc::new(InMemoryTodoStore::with_example())
        } else {
            Arc::new(InMemoryTodoStore::new())
        };
        Self::new(store, &config.telemetry, Arc::new(StreamSink::new()))
    }

    /// Creates a new application state with an empty in-memory store.
    ///
    /// Log records are captured in memory and spans are not logged. This is
    /// useful for development and testing.
    #[must_use]
    pub fn with_in_memory_store() -> Self {
        let mut config = TelemetryConfig::new(crate::config::SERVICE_NAME);
        config.log_spans = false;
        Self::new(
            Arc::new(InMemoryTodoStore::new()),
            &config,
            Arc::new(MemorySink::new()),
        )
    }

    /// Returns a reference to the todo store.
    #[must_use]
    pub fn todo_store(&self) -> &dyn TodoStore {
        self.todo_store.as_ref()
    }

    /// Returns the telemetry bundle.
    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Returns the instrumentation for todo actions.
    #[must_use]
    pub fn operations(&self) -> &Instrumented {
        &self.operations
    }

    /// Returns the buffer of recently ended spans.
    #[must_use]
    pub fn spans(&self) -> &InMemorySpanExporter {
        &self.spans
    }

    /// Returns the logger for request-level events.
    #[must_use]
    pub fn http_logger(&self) -> &Logger {
        &self.http_logger
    }

    /// Sets the active and completed gauges from the current store contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the metrics registry fails.
    pub fn refresh_todo_gauges(&self) -> Result<(), OperationError> {
        self.publish_todo_stats(self.todo_store.stats()?)
    }

    /// Sets the active and completed gauges from stats reported by a store
    /// mutation.
    ///
    /// Stats older than the last published revision are ignored, so
    /// concurrent requests finishing out of order never leave the gauges
    /// behind the store.
    ///
    /// # Errors
    ///
    /// Returns an error if a lock is poisoned or the metrics registry fails.
    // Todo counts stay far below 2^52
    #[allow(clippy::cast_precision_loss)]
    pub fn publish_todo_stats(&self, stats: TodoStats) -> Result<(), OperationError> {
        let mut published = self
            .gauge_revision
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire lock on todo gauges"))?;
        if (*published).is_some_and(|revision| revision > stats.revision) {
            return Ok(());
        }

        let metrics = self.telemetry.metrics();
        metrics.set_gauge(TODOS_ACTIVE, stats.active as f64, &LabelSet::new())?;
        metrics.set_gauge(TODOS_COMPLETED, stats.completed as f64, &LabelSet::new())?;
        *published = Some(stats.revision);
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_in_memory_store()
    }
}
