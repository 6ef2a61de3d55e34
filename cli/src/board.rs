//! Local todo board.
//!
//! `TodoBoard` keeps the client's copy of the todo list. Every action is an
//! instrumented async operation; each successful action ends with a
//! synchronous `apply_state` operation, nested in the action's span, that
//! refreshes the client gauges.

use crate::client::{ClientError, TodoClient};
use serde_json::json;
use shared::models::{LabelSet, Todo, TodoPatch};
use shared::telemetry::{Action, Instrumented, LogSinkError, MetricsAggregator, Telemetry};
use shared::OperationError;
use std::sync::Arc;

const REFRESH: Action = Action::new("fetch_todos", "refresh", "Todos fetched", "Failed to fetch todos");
const ADD: Action = Action::new("add_todo", "add", "Todo added", "Failed to create todo");
const TOGGLE: Action = Action::new("toggle_todo", "toggle", "Todo toggled", "Failed to toggle todo");
const DELETE: Action = Action::new("delete_todo", "delete", "Todo deleted", "Failed to delete todo");
const APPLY_STATE: Action = Action::new(
    "apply_state",
    "apply_state",
    "Board state updated",
    "Failed to update board state",
);

/// Gauge: todos on the board.
pub const TODOS_TOTAL: &str = "todos_total";
/// Gauge: completed todos on the board.
pub const TODOS_COMPLETED: &str = "todos_completed";
/// Gauge: pending todos on the board.
pub const TODOS_PENDING: &str = "todos_pending";
/// Counter: todos added.
pub const TODOS_ADDED: &str = "todos_added";
/// Counter: todos marked completed.
pub const TODOS_COMPLETED_ACTION: &str = "todos_completed_action";
/// Counter: todos marked not completed.
pub const TODOS_UNCOMPLETED_ACTION: &str = "todos_uncompleted_action";
/// Counter: todos deleted.
pub const TODOS_DELETED: &str = "todos_deleted";

/// Remote todo operations the board depends on.
#[allow(async_fn_in_trait)]
pub trait TodoApi {
    /// Lists every todo.
    async fn list(&self) -> Result<Vec<Todo>, ClientError>;
    /// Creates a todo.
    async fn create(&self, text: &str) -> Result<Todo, ClientError>;
    /// Applies a patch to a todo.
    async fn update(&self, id: u64, patch: &TodoPatch) -> Result<Todo, ClientError>;
    /// Deletes a todo.
    async fn delete(&self, id: u64) -> Result<(), ClientError>;
}

impl TodoApi for TodoClient {
    async fn list(&self) -> Result<Vec<Todo>, ClientError> {
        TodoClient::list(self).await
    }

    async fn create(&self, text: &str) -> Result<Todo, ClientError> {
        TodoClient::create(self, text).await
    }

    async fn update(&self, id: u64, patch: &TodoPatch) -> Result<Todo, ClientError> {
        TodoClient::update(self, id, patch).await
    }

    async fn delete(&self, id: u64) -> Result<(), ClientError> {
        TodoClient::delete(self, id).await
    }
}

fn increment(metrics: &MetricsAggregator, name: &str) -> Result<(), OperationError> {
    metrics.increment(name, &LabelSet::new())?;
    Ok(())
}

// Todo counts stay far below 2^52
#[allow(clippy::cast_precision_loss)]
fn apply_state(
    operations: &Instrumented,
    metrics: &MetricsAggregator,
    todos: &[Todo],
) -> Result<(), OperationError> {
    operations.run(&APPLY_STATE, json!({"todos.count": todos.len()}), |_| {
        let completed = todos.iter().filter(|t| t.completed).count();
        let labels = LabelSet::new();
        metrics.set_gauge(TODOS_TOTAL, todos.len() as f64, &labels)?;
        metrics.set_gauge(TODOS_COMPLETED, completed as f64, &labels)?;
        metrics.set_gauge(TODOS_PENDING, (todos.len() - completed) as f64, &labels)?;
        Ok(())
    })
}

/// Client-side todo list with instrumented actions.
pub struct TodoBoard<A> {
    api: A,
    todos: Vec<Todo>,
    operations: Instrumented,
    metrics: Arc<MetricsAggregator>,
}

impl<A: TodoApi> TodoBoard<A> {
    /// Creates an empty board.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount record cannot be logged.
    pub fn new(api: A, telemetry: &Telemetry) -> Result<Self, LogSinkError> {
        let operations = Instrumented::new(telemetry, "TodoList", "todoscope_client");
        operations
            .logger()
            .info("TodoList component mounted", serde_json::Value::Null)?;
        Ok(Self {
            api,
            todos: Vec::new(),
            operations,
            metrics: telemetry.metrics(),
        })
    }

    /// Todos currently on the board.
    #[must_use]
    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    /// Replaces the board with the server's list.
    ///
    /// # Errors
    ///
    /// Returns the failure of the list request or of the state update.
    pub async fn refresh(&mut self) -> Result<usize, OperationError> {
        let Self {
            ref api,
            ref mut todos,
            ref operations,
            ref metrics,
        } = *self;

        operations
            .run_async(&REFRESH, json!({}), |span| async move {
                let fetched = api.list().await?;
                span.set_attribute("todos.count", fetched.len());
                *todos = fetched;
                apply_state(operations, metrics, todos)?;
                Ok(todos.len())
            })
            .await
    }

    /// Creates a todo from `text`.
    ///
    /// Blank text is rejected without contacting the server.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank text, or the failure of the
    /// create request.
    pub async fn add(&mut self, text: &str) -> Result<Todo, OperationError> {
        let Self {
            ref api,
            ref mut todos,
            ref operations,
            ref metrics,
        } = *self;
        let text = text.trim();

        operations
            .run_async(&ADD, json!({"todo.text": text}), |span| async move {
                if text.is_empty() {
                    return Err(OperationError::validation("Todo text is required"));
                }

                let created = api.create(text).await?;
                span.set_attribute("todo.id", created.id);
                todos.push(created.clone());
                increment(metrics, TODOS_ADDED)?;
                apply_state(operations, metrics, todos)?;
                Ok(created)
            })
            .await
    }

    /// Flips the completion state of a todo on the board.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the todo is not on the board, or the
    /// failure of the update request.
    pub async fn toggle(&mut self, id: u64) -> Result<Todo, OperationError> {
        let Self {
            ref api,
            ref mut todos,
            ref operations,
            ref metrics,
        } = *self;

        operations
            .run_async(&TOGGLE, json!({"todo.id": id}), |span| async move {
                let completed = !todos
                    .iter()
                    .find(|t| t.id == id)
                    .ok_or_else(|| OperationError::not_found("Todo not found"))?
                    .completed;

                let updated = api.update(id, &TodoPatch::completed(completed)).await?;
                span.set_attribute("todo.completed", updated.completed);
                if let Some(todo) = todos.iter_mut().find(|t| t.id == id) {
                    *todo = updated.clone();
                }
                increment(
                    metrics,
                    if completed {
                        TODOS_COMPLETED_ACTION
                    } else {
                        TODOS_UNCOMPLETED_ACTION
                    },
                )?;
                apply_state(operations, metrics, todos)?;
                Ok(updated)
            })
            .await
    }

    /// Deletes a todo.
    ///
    /// # Errors
    ///
    /// Returns the failure of the delete request.
    pub async fn delete(&mut self, id: u64) -> Result<(), OperationError> {
        let Self {
            ref api,
            ref mut todos,
            ref operations,
            ref metrics,
        } = *self;

        operations
            .run_async(&DELETE, json!({"todo.id": id}), |_| async move {
                api.delete(id).await?;
                todos.retain(|t| t.id != id);
                increment(metrics, TODOS_DELETED)?;
                apply_state(operations, metrics, todos)?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::config::TelemetryConfig;
    use shared::models::{LogLevel, SpanStatus};
    use shared::telemetry::{InMemorySpanExporter, MemorySink};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeApi {
        todos: Mutex<Vec<Todo>>,
        calls: AtomicUsize,
        fail_with: Mutex<Option<u16>>,
    }

    impl FakeApi {
        fn with_todos(todos: Vec<Todo>) -> Self {
            Self {
                todos: Mutex::new(todos),
                ..Self::default()
            }
        }

        fn begin(&self) -> Result<(), ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with.lock().unwrap().take() {
                Some(status) => Err(ClientError::Http {
                    status,
                    message: "Internal server error".to_string(),
                }),
                None => Ok(()),
            }
        }
    }

    impl TodoApi for FakeApi {
        async fn list(&self) -> Result<Vec<Todo>, ClientError> {
            self.begin()?;
            Ok(self.todos.lock().unwrap().clone())
        }

        async fn create(&self, text: &str) -> Result<Todo, ClientError> {
            self.begin()?;
            let mut todos = self.todos.lock().unwrap();
            let id = todos.iter().map(|t| t.id).max().unwrap_or(0) + 1;
            let todo = Todo::new(id, text);
            todos.push(todo.clone());
            Ok(todo)
        }

        async fn update(&self, id: u64, patch: &TodoPatch) -> Result<Todo, ClientError> {
            self.begin()?;
            let mut todos = self.todos.lock().unwrap();
            let todo = todos
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| ClientError::Http {
                    status: 404,
                    message: "Todo not found".to_string(),
                })?;
            patch.apply(todo);
            Ok(todo.clone())
        }

        async fn delete(&self, id: u64) -> Result<(), ClientError> {
            self.begin()?;
            let mut todos = self.todos.lock().unwrap();
            let before = todos.len();
            todos.retain(|t| t.id != id);
            if todos.len() == before {
                return Err(ClientError::Http {
                    status: 404,
                    message: "Todo not found".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Harness {
        board: TodoBoard<FakeApi>,
        telemetry: Telemetry,
        sink: Arc<MemorySink>,
        spans: Arc<InMemorySpanExporter>,
    }

    fn harness(api: FakeApi) -> Harness {
        let sink = Arc::new(MemorySink::new());
        let spans = Arc::new(InMemorySpanExporter::new(64));
        let mut config = TelemetryConfig::new("todoscope-cli");
        config.log_level = LogLevel::Debug;
        let telemetry = Telemetry::new(&config, sink.clone(), spans.clone());
        Harness {
            board: TodoBoard::new(api, &telemetry).unwrap(),
            telemetry,
            sink,
            spans,
        }
    }

    impl Harness {
        fn gauge(&self, name: &str) -> Option<f64> {
            self.telemetry
                .metrics()
                .snapshot()
                .unwrap()
                .gauge(name, &LabelSet::new())
        }

        fn counter(&self, name: &str) -> Option<f64> {
            self.telemetry
                .metrics()
                .snapshot()
                .unwrap()
                .counter(name, &LabelSet::new())
        }
    }

    fn seeded() -> FakeApi {
        let mut done = Todo::new(2, "done");
        done.completed = true;
        FakeApi::with_todos(vec![Todo::new(1, "open"), done])
    }

    #[tokio::test]
    async fn test_refresh_sets_gauges() {
        let mut h = harness(seeded());

        let count = h.board.refresh().await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(h.gauge(TODOS_TOTAL), Some(2.0));
        assert_eq!(h.gauge(TODOS_COMPLETED), Some(1.0));
        assert_eq!(h.gauge(TODOS_PENDING), Some(1.0));
        assert_eq!(h.spans.find("fetch_todos")[0].attributes["todos.count"], 2);
    }

    #[tokio::test]
    async fn test_add_counts_and_nests_state_update() {
        let mut h = harness(FakeApi::default());

        for text in ["a", "b", "c"] {
            h.board.add(text).await.unwrap();
        }

        assert_eq!(h.counter(TODOS_ADDED), Some(3.0));
        assert_eq!(h.gauge(TODOS_TOTAL), Some(3.0));
        assert_eq!(h.board.todos().len(), 3);

        let add = &h.spans.find("add_todo")[0];
        let apply = &h.spans.find("apply_state")[0];
        assert_eq!(apply.parent_span_id.as_deref(), Some(add.span_id.as_str()));
        assert_eq!(apply.trace_id, add.trace_id);
        assert_eq!(add.attributes["todo.id"], 1);

        let logged = &h.sink.find("Todo added")[0];
        assert_eq!(logged.context, "TodoList");
        assert_eq!(logged.trace_id.as_deref(), Some(add.trace_id.as_str()));
    }

    #[test]
    fn test_blank_text_never_reaches_server() {
        let mut h = harness(FakeApi::default());

        let result = tokio_test::block_on(h.board.add("   "));

        assert!(matches!(result, Err(OperationError::Validation(_))));
        assert_eq!(h.board.api.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.counter(TODOS_ADDED), None);
        assert_eq!(h.sink.find("Failed to create todo")[0].level, LogLevel::Warn);
        assert_eq!(h.spans.find("add_todo")[0].status, SpanStatus::Error);
    }

    #[tokio::test]
    async fn test_toggle_counts_both_directions() {
        let mut h = harness(seeded());
        h.board.refresh().await.unwrap();

        let toggled = h.board.toggle(1).await.unwrap();
        assert!(toggled.completed);
        assert_eq!(h.counter(TODOS_COMPLETED_ACTION), Some(1.0));
        assert_eq!(h.gauge(TODOS_COMPLETED), Some(2.0));

        let toggled = h.board.toggle(1).await.unwrap();
        assert!(!toggled.completed);
        assert_eq!(h.counter(TODOS_UNCOMPLETED_ACTION), Some(1.0));
        assert_eq!(h.gauge(TODOS_PENDING), Some(1.0));
    }

    #[tokio::test]
    async fn test_toggle_unknown_id_is_not_found() {
        let mut h = harness(seeded());
        h.board.refresh().await.unwrap();
        let calls = h.board.api.calls.load(Ordering::SeqCst);

        let result = h.board.toggle(99).await;

        assert!(matches!(result, Err(OperationError::NotFound(_))));
        assert_eq!(h.board.api.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_delete_updates_board() {
        let mut h = harness(seeded());
        h.board.refresh().await.unwrap();

        h.board.delete(2).await.unwrap();

        assert_eq!(h.board.todos().len(), 1);
        assert_eq!(h.counter(TODOS_DELETED), Some(1.0));
        assert_eq!(h.gauge(TODOS_COMPLETED), Some(0.0));
    }

    #[tokio::test]
    async fn test_delete_missing_todo_maps_404() {
        let mut h = harness(FakeApi::default());

        let result = h.board.delete(5).await;

        assert!(matches!(result, Err(OperationError::NotFound(_))));
        assert_eq!(h.sink.find("Failed to delete todo")[0].level, LogLevel::Warn);
        assert_eq!(h.counter(TODOS_DELETED), None);
    }

    #[tokio::test]
    async fn test_server_error_logged_at_error() {
        let api = seeded();
        *api.fail_with.lock().unwrap() = Some(500);
        let mut h = harness(api);

        let result = h.board.refresh().await;

        assert!(matches!(result, Err(OperationError::Unexpected(_))));
        assert!(h.board.todos().is_empty());
        let logged = &h.sink.find("Failed to fetch todos")[0];
        assert_eq!(logged.level, LogLevel::Error);
        assert!(logged.metadata["error_chain"]
            .as_str()
            .unwrap()
            .contains("500"));
    }
}
