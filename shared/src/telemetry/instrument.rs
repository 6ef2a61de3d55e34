//! Instrumented business actions.
//!
//! `Instrumented` composes the tracer, the logger and the metrics aggregator
//! so that every action is observed the same way: one span, one log event,
//! one counter increment and one duration observation.

use crate::error::OperationError;
use crate::models::LabelSet;
use crate::telemetry::{LogSinkError, Logger, MetricsAggregator, Span, SpanTracer, Telemetry};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Static description of one business action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    /// Span name.
    pub name: &'static str,
    /// Value of the `operation` metric label.
    pub operation: &'static str,
    /// Message logged on success.
    pub success_message: &'static str,
    /// Message logged on failure.
    pub failure_message: &'static str,
}

impl Action {
    /// Creates an action description.
    #[must_use]
    pub const fn new(
        name: &'static str,
        operation: &'static str,
        success_message: &'static str,
        failure_message: &'static str,
    ) -> Self {
        Self {
            name,
            operation,
            success_message,
            failure_message,
        }
    }
}

/// The action's own result always wins over a failed log write, which goes to
/// the diagnostic subscriber instead.
fn report_log_failure(action: &Action, logged: Result<(), LogSinkError>) {
    if let Err(e) = logged {
        tracing::error!(error = %e, operation = action.operation, "Failed to emit operation log");
    }
}

/// Runs business actions under span, log and metric instrumentation.
///
/// The counter `{prefix}_operations_total{operation,outcome}` and the
/// histogram `{prefix}_operation_duration_seconds{operation}` are updated on
/// every exit path. Failures are observed and handed back unchanged.
#[derive(Debug, Clone)]
pub struct Instrumented {
    logger: Logger,
    tracer: SpanTracer,
    metrics: Arc<MetricsAggregator>,
    counter_name: String,
    duration_name: String,
}

impl Instrumented {
    /// Creates the instrumentation for one component.
    #[must_use]
    pub fn new(telemetry: &Telemetry, context: &str, metric_prefix: &str) -> Self {
        let counter_name = format!("{metric_prefix}_operations_total");
        let duration_name = format!("{metric_prefix}_operation_duration_seconds");

        let metrics = telemetry.metrics();
        for (name, help) in [
            (&counter_name, "Total number of operations by outcome"),
            (&duration_name, "Operation duration in seconds"),
        ] {
            if let Err(e) = metrics.describe(name, help) {
                tracing::warn!(error = %e, metric = %name, "Failed to describe metric");
            }
        }

        Self {
            logger: telemetry.logger(context),
            tracer: telemetry.tracer().clone(),
            metrics,
            counter_name,
            duration_name,
        }
    }

    /// Logger bound to this component's context.
    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Runs a synchronous action.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `body`, unchanged.
    pub fn run<T, F>(&self, action: &Action, attributes: Value, body: F) -> Result<T, OperationError>
    where
        F: FnOnce(&Span) -> Result<T, OperationError>,
    {
        let started = Instant::now();
        self.tracer.run_with_span(action.name, attributes, |span| {
            let result = body(span);
            self.observe(action, span, &result, started.elapsed());
            result
        })
    }

    /// Runs an asynchronous action.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `body`, unchanged.
    pub async fn run_async<T, F, Fut>(
        &self,
        action: &Action,
        attributes: Value,
        body: F,
    ) -> Result<T, OperationError>
    where
        F: FnOnce(Span) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let started = Instant::now();
        self.tracer
            .run_with_span_async(action.name, attributes, |span| async move {
                let result = body(span.clone()).await;
                self.observe(action, &span, &result, started.elapsed());
                result
            })
            .await
    }

    fn observe<T>(
        &self,
        action: &Action,
        span: &Span,
        result: &Result<T, OperationError>,
        elapsed: Duration,
    ) {
        let seconds = elapsed.as_secs_f64();
        let duration_ms = seconds * 1000.0;

        let outcome = match result {
            Ok(_) => {
                let mut metadata = span.attributes();
                metadata.insert("operation".to_string(), json!(action.operation));
                metadata.insert("duration_ms".to_string(), json!(duration_ms));
                let logged = self
                    .logger
                    .info(action.success_message, Value::Object(metadata));
                report_log_failure(action, logged);
                "success"
            }
            Err(e) => {
                span.set_error(e.to_string());
                let metadata = json!({
                    "operation": action.operation,
                    "error": e.to_string(),
                    "outcome": e.outcome(),
                    "duration_ms": duration_ms,
                });
                let logged = if e.is_expected() {
                    self.logger.warn(action.failure_message, metadata)
                } else {
                    let mut metadata = metadata;
                    metadata["error_chain"] = json!(format!("{e:?}"));
                    self.logger.error(action.failure_message, metadata)
                };
                report_log_failure(action, logged);
                e.outcome()
            }
        };

        let labels = LabelSet::new()
            .with("operation", action.operation)
            .with("outcome", outcome);
        if let Err(e) = self.metrics.increment(&self.counter_name, &labels) {
            tracing::warn!(error = %e, "Failed to count operation");
        }

        let labels = LabelSet::new().with("operation", action.operation);
        if let Err(e) = self
            .metrics
            .record_histogram(&self.duration_name, seconds, &labels)
        {
            tracing::warn!(error = %e, "Failed to record operation duration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryConfig;
    use crate::models::{LogLevel, SpanStatus};
    use crate::telemetry::{InMemorySpanExporter, MemorySink};
    use anyhow::anyhow;

    const CREATE: Action = Action::new("create_todo", "create", "Todo created", "Failed to create todo");

    struct Harness {
        operations: Instrumented,
        telemetry: Telemetry,
        sink: Arc<MemorySink>,
        spans: Arc<InMemorySpanExporter>,
    }

    fn harness() -> Harness {
        let sink = Arc::new(MemorySink::new());
        let spans = Arc::new(InMemorySpanExporter::new(32));
        let telemetry = Telemetry::new(&TelemetryConfig::new("test"), sink.clone(), spans.clone());
        Harness {
            operations: Instrumented::new(&telemetry, "TodoService", "test_todo"),
            telemetry,
            sink,
            spans,
        }
    }

    fn outcome_count(h: &Harness, outcome: &str) -> Option<f64> {
        h.telemetry.metrics().snapshot().unwrap().counter(
            "test_todo_operations_total",
            &LabelSet::new()
                .with("operation", "create")
                .with("outcome", outcome),
        )
    }

    #[test]
    fn test_success_is_fully_observed() {
        let h = harness();

        let id = h
            .operations
            .run(&CREATE, json!({"http.method": "POST"}), |span| {
                span.set_attribute("todo.id", 5);
                Ok(5)
            })
            .unwrap();

        assert_eq!(id, 5);

        let spans = h.spans.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "create_todo");
        assert_eq!(spans[0].status, SpanStatus::Ok);

        let logs = h.sink.find("Todo created");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LogLevel::Info);
        assert_eq!(logs[0].context, "TodoService");
        assert_eq!(logs[0].metadata["todo.id"], json!(5));
        assert_eq!(logs[0].metadata["operation"], json!("create"));
        assert_eq!(logs[0].trace_id.as_deref(), Some(spans[0].trace_id.as_str()));

        assert_eq!(outcome_count(&h, "success"), Some(1.0));
        let snapshot = h.telemetry.metrics().snapshot().unwrap();
        let histogram = snapshot
            .histogram(
                "test_todo_operation_duration_seconds",
                &LabelSet::new().with("operation", "create"),
            )
            .unwrap();
        assert_eq!(histogram.count, 1);
    }

    #[test]
    fn test_validation_failure_logged_at_warn() {
        let h = harness();

        let result: Result<(), _> = h.operations.run(&CREATE, Value::Null, |_| {
            Err(OperationError::validation("Todo text is required"))
        });

        assert!(matches!(result, Err(OperationError::Validation(ref m)) if m == "Todo text is required"));

        let span = &h.spans.spans()[0];
        assert_eq!(span.status, SpanStatus::Error);
        assert_eq!(span.attributes["error"], json!(true));
        assert_eq!(span.attributes["error.message"], json!("Todo text is required"));

        let logs = h.sink.find("Failed to create todo");
        assert_eq!(logs[0].level, LogLevel::Warn);
        assert_eq!(outcome_count(&h, "validation_error"), Some(1.0));
        assert_eq!(outcome_count(&h, "success"), None);
    }

    #[test]
    fn test_unexpected_failure_logged_at_error_with_chain() {
        let h = harness();

        let result: Result<(), _> = h.operations.run(&CREATE, Value::Null, |_| {
            Err(anyhow!("disk full").context("store write failed").into())
        });

        assert!(matches!(result, Err(OperationError::Unexpected(_))));

        let logs = h.sink.find("Failed to create todo");
        assert_eq!(logs[0].level, LogLevel::Error);
        let chain = logs[0].metadata["error_chain"].as_str().unwrap();
        assert!(chain.contains("disk full"));
        assert_eq!(outcome_count(&h, "error"), Some(1.0));
    }

    #[test]
    fn test_async_success_nests_child_action() {
        let h = harness();
        const FETCH: Action = Action::new("fetch_todos", "list", "Todos fetched", "Failed to fetch todos");

        let count = tokio_test::block_on(h.operations.run_async(&FETCH, Value::Null, |outer| {
            let operations = h.operations.clone();
            async move {
                operations
                    .run(&CREATE, Value::Null, |inner| {
                        assert_eq!(inner.parent_span_id(), Some(outer.span_id()));
                        Ok(())
                    })
                    .map(|()| 2)
            }
        }))
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(h.spans.len(), 2);
        assert_eq!(h.sink.find("Todos fetched").len(), 1);
        assert_eq!(outcome_count(&h, "success"), Some(1.0));
    }

    #[tokio::test]
    async fn test_async_not_found_observed() {
        let h = harness();
        const DELETE: Action = Action::new("delete_todo", "delete", "Todo deleted", "Failed to delete todo");

        let result: Result<(), _> = h
            .operations
            .run_async(&DELETE, json!({"todo.id": 99}), |_| async {
                tokio::task::yield_now().await;
                Err(OperationError::not_found("Todo not found"))
            })
            .await;

        assert!(matches!(result, Err(OperationError::NotFound(_))));
        assert_eq!(h.spans.find("delete_todo")[0].status, SpanStatus::Error);
        assert_eq!(h.sink.find("Failed to delete todo")[0].level, LogLevel::Warn);

        let snapshot = h.telemetry.metrics().snapshot().unwrap();
        assert_eq!(
            snapshot.counter(
                "test_todo_operations_total",
                &LabelSet::new()
                    .with("operation", "delete")
                    .with("outcome", "not_found"),
            ),
            Some(1.0)
        );
    }
}
