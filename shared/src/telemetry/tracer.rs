//! Span lifecycle management.
//!
//! `SpanTracer` brackets synchronous and asynchronous units of work with a
//! span: start, attributes, error capture, end. The active span is scoped to
//! the current tokio task (or the current synchronous call), so concurrent
//! requests never observe each other's span.

use crate::models::{into_attributes, Attributes, SpanRecord, SpanStatus};
use crate::telemetry::exporter::SpanExporter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::Instrument;
use uuid::Uuid;

tokio::task_local! {
    static ACTIVE_SPAN: Span;
}

/// Returns the span active on the current task, if any.
#[must_use]
pub fn active_span() -> Option<Span> {
    ACTIVE_SPAN.try_with(Span::clone).ok()
}

#[derive(Debug, Default)]
struct SpanState {
    attributes: Attributes,
    status: SpanStatus,
    exception: Option<String>,
    end_time: Option<DateTime<Utc>>,
}

struct SpanInner {
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
    name: String,
    service: Arc<str>,
    start_time: DateTime<Utc>,
    state: Mutex<SpanState>,
    exporter: Arc<dyn SpanExporter>,
}

/// Handle to a running span.
///
/// Cloning the handle does not create a new span; every clone refers to the
/// same unit of work.
#[derive(Clone)]
pub struct Span {
    inner: Arc<SpanInner>,
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Span")
            .field("name", &self.inner.name)
            .field("trace_id", &self.inner.trace_id)
            .field("span_id", &self.inner.span_id)
            .field("parent_span_id", &self.inner.parent_span_id)
            .finish_non_exhaustive()
    }
}

impl Span {
    fn state(&self) -> MutexGuard<'_, SpanState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Trace this span belongs to.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.inner.trace_id
    }

    /// Unique id of this span.
    #[must_use]
    pub fn span_id(&self) -> &str {
        &self.inner.span_id
    }

    /// Id of the enclosing span, `None` for a root span.
    #[must_use]
    pub fn parent_span_id(&self) -> Option<&str> {
        self.inner.parent_span_id.as_deref()
    }

    /// Name of the unit of work.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Sets an attribute. Ignored once the span has ended.
    ///
    /// Values that fail to serialize are stored as `null`.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        let mut state = self.state();
        if state.end_time.is_none() {
            state.attributes.insert(key.into(), value);
        }
    }

    /// Returns a single attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.state().attributes.get(key).cloned()
    }

    /// Returns a copy of every attribute.
    #[must_use]
    pub fn attributes(&self) -> Attributes {
        self.state().attributes.clone()
    }

    /// Marks the span as failed with `error = true` and `error.message`.
    pub fn set_error(&self, message: impl Into<String>) {
        let mut state = self.state();
        if state.end_time.is_some() {
            return;
        }
        state.attributes.insert("error".to_string(), Value::Bool(true));
        state
            .attributes
            .insert("error.message".to_string(), Value::String(message.into()));
        state.status = SpanStatus::Error;
    }

    /// Captures an error on the span and marks it as failed.
    pub fn record_exception(&self, error: &dyn Display, type_name: &str) {
        let message = error.to_string();
        let mut state = self.state();
        if state.end_time.is_some() {
            return;
        }
        state.attributes.insert(
            "exception.message".to_string(),
            Value::String(message.clone()),
        );
        state.attributes.insert(
            "exception.type".to_string(),
            Value::String(type_name.to_string()),
        );
        state.exception = Some(message);
        state.status = SpanStatus::Error;
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SpanStatus {
        self.state().status
    }

    /// Returns true once the span has ended.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.state().end_time.is_some()
    }

    /// Ends the span and hands it to the exporter.
    ///
    /// Returns `false` without exporting if the span had already ended.
    pub fn end(&self) -> bool {
        let mut state = self.state();
        if state.end_time.is_some() {
            drop(state);
            tracing::debug!(span = %self.inner.name, span_id = %self.inner.span_id, "Span already ended");
            return false;
        }

        let end_time = Utc::now();
        state.end_time = Some(end_time);
        let record = SpanRecord {
            trace_id: self.inner.trace_id.clone(),
            span_id: self.inner.span_id.clone(),
            parent_span_id: self.inner.parent_span_id.clone(),
            name: self.inner.name.clone(),
            service: self.inner.service.to_string(),
            status: state.status,
            start_time: self.inner.start_time,
            end_time,
            attributes: state.attributes.clone(),
            exception: state.exception.clone(),
        };
        drop(state);

        self.inner.exporter.export(record);
        true
    }

    fn diagnostic_span(&self) -> tracing::Span {
        tracing::debug_span!(
            "span",
            name = %self.inner.name,
            trace_id = %self.inner.trace_id,
            span_id = %self.inner.span_id,
        )
    }
}

/// Ends its span on every exit path.
///
/// `complete` records the operation's result. If the guard is dropped
/// without completing (panic, cancelled future), the span ends as ERROR.
struct SpanGuard {
    span: Span,
}

impl SpanGuard {
    fn complete<T, E: Display>(self, result: &Result<T, E>) {
        if let Err(e) = result {
            self.span.record_exception(e, std::any::type_name::<E>());
        }
        self.span.end();
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if self.span.is_ended() {
            return;
        }
        let message = if std::thread::panicking() {
            "operation panicked"
        } else {
            "operation dropped before completion"
        };
        self.span.record_exception(&message, "abandoned");
        self.span.end();
    }
}

/// 64 random bits as 16 hex chars. Folding both uuid halves together keeps
/// the fixed version and variant bits out of the id.
fn new_span_id() -> String {
    let (high, low) = Uuid::new_v4().as_u64_pair();
    format!("{:016x}", high ^ low)
}

/// Creates spans for one service.
///
/// # Example
///
/// ```
/// use shared::telemetry::{InMemorySpanExporter, SpanTracer};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let exporter = Arc::new(InMemorySpanExporter::new(16));
/// let tracer = SpanTracer::new("todoscope", exporter.clone());
///
/// let result = tracer.run_with_span("add_todo", json!({"todo.text": "milk"}), |_span| {
///     Err::<(), _>("boom")
/// });
///
/// assert_eq!(result, Err("boom"));
/// let span = &exporter.spans()[0];
/// assert!(span.is_error());
/// assert_eq!(span.exception.as_deref(), Some("boom"));
/// ```
#[derive(Clone)]
pub struct SpanTracer {
    service: Arc<str>,
    exporter: Arc<dyn SpanExporter>,
}

impl std::fmt::Debug for SpanTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanTracer")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl SpanTracer {
    /// Creates a tracer that hands ended spans to `exporter`.
    #[must_use]
    pub fn new(service: impl Into<String>, exporter: Arc<dyn SpanExporter>) -> Self {
        Self {
            service: Arc::from(service.into()),
            exporter,
        }
    }

    /// Service name stamped on every span.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the span active on the current task, if any.
    #[must_use]
    pub fn active_span(&self) -> Option<Span> {
        active_span()
    }

    /// Starts a span without activating it.
    ///
    /// The span is a child of the active span when there is one, and a new
    /// trace root otherwise. The caller must call [`Span::end`].
    #[must_use]
    pub fn start_span(&self, name: &str, attributes: Value) -> Span {
        let parent = active_span();
        let trace_id = parent.as_ref().map_or_else(
            || Uuid::new_v4().simple().to_string(),
            |p| p.trace_id().to_string(),
        );
        let span_id = new_span_id();

        Span {
            inner: Arc::new(SpanInner {
                trace_id,
                span_id,
                parent_span_id: parent.map(|p| p.span_id().to_string()),
                name: name.to_string(),
                service: Arc::clone(&self.service),
                start_time: Utc::now(),
                state: Mutex::new(SpanState {
                    attributes: into_attributes(attributes),
                    ..SpanState::default()
                }),
                exporter: Arc::clone(&self.exporter),
            }),
        }
    }

    /// Runs a synchronous operation inside a new active span.
    ///
    /// The previous active span is restored on exit. On `Err` the error is
    /// captured on the span and returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns whatever error `operation` returns.
    pub fn run_with_span<T, E, F>(&self, name: &str, attributes: Value, operation: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce(&Span) -> Result<T, E>,
    {
        let span = self.start_span(name, attributes);
        let guard = SpanGuard { span: span.clone() };
        let diagnostic = span.diagnostic_span();
        let _entered = diagnostic.enter();

        let result = ACTIVE_SPAN.sync_scope(span.clone(), || operation(&span));
        guard.complete(&result);
        result
    }

    /// Runs an asynchronous operation inside a new active span.
    ///
    /// The span stays active across every await point of `operation`. If the
    /// returned future is dropped before completion the span ends as ERROR.
    ///
    /// # Errors
    ///
    /// Returns whatever error `operation` returns.
    pub async fn run_with_span_async<T, E, F, Fut>(
        &self,
        name: &str,
        attributes: Value,
        operation: F,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnOnce(Span) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let span = self.start_span(name, attributes);
        let guard = SpanGuard { span: span.clone() };
        let diagnostic = span.diagnostic_span();

        let scoped = span.clone();
        let result = ACTIVE_SPAN
            .scope(span, async move { operation(scoped).await })
            .instrument(diagnostic)
            .await;
        guard.complete(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::InMemorySpanExporter;
    use serde_json::json;
    use std::convert::Infallible;
    use std::time::Duration;

    fn test_tracer() -> (SpanTracer, Arc<InMemorySpanExporter>) {
        let exporter = Arc::new(InMemorySpanExporter::new(64));
        (SpanTracer::new("test-service", exporter.clone()), exporter)
    }

    #[test]
    fn test_successful_operation_ends_ok() {
        let (tracer, exporter) = test_tracer();

        let value = tracer
            .run_with_span("add_todo", json!({"todo.text": "milk"}), |span| {
                span.set_attribute("todo.id", 7);
                Ok::<_, Infallible>(42)
            })
            .unwrap();

        assert_eq!(value, 42);
        let spans = exporter.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "add_todo");
        assert_eq!(spans[0].service, "test-service");
        assert_eq!(spans[0].status, SpanStatus::Ok);
        assert_eq!(spans[0].attributes["todo.text"], json!("milk"));
        assert_eq!(spans[0].attributes["todo.id"], json!(7));
        assert!(spans[0].is_root());
        assert!(spans[0].end_time >= spans[0].start_time);
    }

    #[test]
    fn test_failed_operation_records_exception() {
        let (tracer, exporter) = test_tracer();

        let result = tracer.run_with_span("add_todo", json!({}), |_| Err::<(), _>("boom"));

        assert_eq!(result, Err("boom"));
        let spans = exporter.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Error);
        assert_eq!(spans[0].exception.as_deref(), Some("boom"));
        assert_eq!(spans[0].attributes["exception.message"], json!("boom"));
        assert!(spans[0].attributes.contains_key("exception.type"));
    }

    #[test]
    fn test_nested_spans_share_trace_and_link_parent() {
        let (tracer, exporter) = test_tracer();

        tracer
            .run_with_span("outer", Value::Null, |outer| {
                tracer.run_with_span("inner", Value::Null, |inner| {
                    assert_eq!(inner.trace_id(), outer.trace_id());
                    assert_eq!(inner.parent_span_id(), Some(outer.span_id()));
                    Ok::<_, Infallible>(())
                })
            })
            .unwrap();

        let spans = exporter.spans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].name, "inner");
        assert_eq!(spans[1].name, "outer");
        assert_eq!(spans[0].parent_span_id.as_deref(), Some(spans[1].span_id.as_str()));
    }

    #[test]
    fn test_active_span_restored_after_exit() {
        let (tracer, _) = test_tracer();
        assert!(active_span().is_none());

        tracer
            .run_with_span("outer", Value::Null, |outer| {
                tracer
                    .run_with_span("inner", Value::Null, |inner| {
                        assert_eq!(active_span().unwrap().span_id(), inner.span_id());
                        Err::<(), _>("fail")
                    })
                    .ok();
                assert_eq!(active_span().unwrap().span_id(), outer.span_id());
                Ok::<_, Infallible>(())
            })
            .unwrap();

        assert!(active_span().is_none());
    }

    #[test]
    fn test_span_ids_have_no_fixed_digits() {
        let ids: Vec<String> = (0..64).map(|_| new_span_id()).collect();

        assert!(ids
            .iter()
            .all(|id| id.len() == 16 && id.chars().all(|c| c.is_ascii_hexdigit())));
        for position in 0..16 {
            let first = ids[0].as_bytes()[position];
            assert!(
                ids.iter().any(|id| id.as_bytes()[position] != first),
                "hex digit {position} is constant"
            );
        }
    }

    #[test]
    fn test_double_end_is_noop() {
        let (tracer, exporter) = test_tracer();
        let span = tracer.start_span("manual", Value::Null);

        assert!(span.end());
        assert!(!span.end());
        assert_eq!(exporter.len(), 1);
    }

    #[test]
    fn test_attributes_ignored_after_end() {
        let (tracer, exporter) = test_tracer();
        let span = tracer.start_span("manual", json!({"a": 1}));
        span.end();

        span.set_attribute("b", 2);
        span.set_error("late");

        assert!(span.attribute("b").is_none());
        assert_eq!(span.status(), SpanStatus::Ok);
        assert!(!exporter.spans()[0].attributes.contains_key("b"));
    }

    #[test]
    fn test_non_object_attributes_are_wrapped() {
        let (tracer, _) = test_tracer();
        let span = tracer.start_span("manual", json!("scalar"));
        assert_eq!(span.attribute("value"), Some(json!("scalar")));
    }

    #[test]
    fn test_panic_ends_span_as_error() {
        let (tracer, exporter) = test_tracer();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tracer.run_with_span("explode", Value::Null, |_| -> Result<(), Infallible> {
                panic!("kaboom")
            })
        }));

        assert!(outcome.is_err());
        let spans = exporter.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Error);
        assert_eq!(spans[0].exception.as_deref(), Some("operation panicked"));
        assert!(active_span().is_none());
    }

    #[tokio::test]
    async fn test_async_span_active_across_await() {
        let (tracer, exporter) = test_tracer();

        let seen = tracer
            .run_with_span_async("fetch", Value::Null, |span| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let active = active_span().map(|s| s.span_id().to_string());
                assert_eq!(active.as_deref(), Some(span.span_id()));
                Ok::<_, Infallible>(active)
            })
            .await
            .unwrap();

        assert!(seen.is_some());
        assert!(active_span().is_none());
        assert_eq!(exporter.len(), 1);
    }

    #[tokio::test]
    async fn test_async_error_returned_unchanged() {
        let (tracer, exporter) = test_tracer();

        let result: Result<(), String> = tracer
            .run_with_span_async("delete_todo", Value::Null, |_| async {
                Err("Todo not found".to_string())
            })
            .await;

        assert_eq!(result, Err("Todo not found".to_string()));
        assert_eq!(exporter.spans()[0].exception.as_deref(), Some("Todo not found"));
    }

    #[tokio::test]
    async fn test_sync_child_of_async_parent() {
        let (tracer, exporter) = test_tracer();

        tracer
            .run_with_span_async("handle_add", Value::Null, |parent| {
                let tracer = tracer.clone();
                async move {
                    tokio::task::yield_now().await;
                    tracer.run_with_span("apply_state", Value::Null, |child| {
                        assert_eq!(child.parent_span_id(), Some(parent.span_id()));
                        Ok::<_, Infallible>(())
                    })
                }
            })
            .await
            .unwrap();

        assert_eq!(exporter.len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_future_ends_span_as_error() {
        let (tracer, exporter) = test_tracer();

        let outcome = tokio::time::timeout(
            Duration::from_millis(10),
            tracer.run_with_span_async("slow", Value::Null, |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, Infallible>(())
            }),
        )
        .await;

        assert!(outcome.is_err());
        let spans = exporter.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Error);
        assert_eq!(
            spans[0].exception.as_deref(),
            Some("operation dropped before completion")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_tasks_never_share_active_span() {
        let (tracer, exporter) = test_tracer();

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let tracer = tracer.clone();
                tokio::spawn(async move {
                    tracer
                        .run_with_span_async("update_todo", json!({"todo.id": i}), |span| async move {
                            for _ in 0..10 {
                                tokio::task::yield_now().await;
                                let active = active_span().unwrap();
                                assert_eq!(active.span_id(), span.span_id());
                            }
                            Ok::<_, Infallible>(span.trace_id().to_string())
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut traces = Vec::new();
        for handle in handles {
            traces.push(handle.await.unwrap());
        }

        assert_ne!(traces[0], traces[1]);
        assert!(exporter.spans().iter().all(SpanRecord::is_root));
    }
}
