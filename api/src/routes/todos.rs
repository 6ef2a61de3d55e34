//! Todo CRUD endpoints.
//!
//! Every handler runs as an instrumented action: one span, one log event and
//! one `todoscope_todo_operations_total` increment per request, whatever the
//! outcome.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde_json::json;
use shared::models::{NewTodo, Todo, TodoPatch};
use shared::telemetry::Action;
use shared::OperationError;

const LIST: Action = Action::new("get_todos", "list", "Fetching all todos", "Failed to fetch todos");
const CREATE: Action = Action::new("create_todo", "create", "Todo created", "Failed to create todo");
const UPDATE: Action = Action::new("update_todo", "update", "Todo updated", "Failed to update todo");
const DELETE: Action = Action::new("delete_todo", "delete", "Todo deleted", "Failed to delete todo");

const NOT_FOUND: &str = "Todo not found";

/// Creates the todo routes.
pub fn todos_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/todos", get(list_todos).post(create_todo))
        .route("/api/todos/{id}", put(update_todo).delete(delete_todo))
        .with_state(state)
}

fn parse_id(id: Result<Path<u64>, PathRejection>) -> Result<u64, OperationError> {
    id.map(|Path(id)| id)
        .map_err(|_| OperationError::validation("Todo id must be a positive integer"))
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, OperationError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| OperationError::validation(rejection.body_text()))
}

async fn list_todos(State(state): State<AppState>) -> Result<Json<Vec<Todo>>, ApiError> {
    let todos = state.operations().run(
        &LIST,
        json!({"http.method": "GET", "http.route": "/api/todos"}),
        |span| {
            let todos = state.todo_store().list()?;
            span.set_attribute("todos.count", todos.len());
            Ok(todos)
        },
    )?;
    Ok(Json(todos))
}

async fn create_todo(
    State(state): State<AppState>,
    payload: Result<Json<NewTodo>, JsonRejection>,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let todo = state.operations().run(
        &CREATE,
        json!({"http.method": "POST", "http.route": "/api/todos"}),
        |span| {
            let new_todo = parse_body(payload)?;
            new_todo.validate_new()?;

            let written = state.todo_store().create(new_todo)?;
            let todo = written.value;
            span.set_attribute("todo.id", todo.id);
            span.set_attribute("todo.text", &todo.text);
            state.publish_todo_stats(written.stats)?;
            Ok(todo)
        },
    )?;
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn update_todo(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<TodoPatch>, JsonRejection>,
) -> Result<Json<Todo>, ApiError> {
    let todo = state.operations().run(
        &UPDATE,
        json!({"http.method": "PUT", "http.route": "/api/todos/{id}"}),
        |span| {
            let id = parse_id(id)?;
            span.set_attribute("todo.id", id);
            let patch = parse_body(payload)?;
            patch.validate_patch()?;

            let written = state
                .todo_store()
                .update(id, &patch)?
                .ok_or_else(|| OperationError::not_found(NOT_FOUND))?;
            span.set_attribute("todo.completed", written.value.completed);
            state.publish_todo_stats(written.stats)?;
            Ok(written.value)
        },
    )?;
    Ok(Json(todo))
}

async fn delete_todo(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    state.operations().run(
        &DELETE,
        json!({"http.method": "DELETE", "http.route": "/api/todos/{id}"}),
        |span| {
            let id = parse_id(id)?;
            span.set_attribute("todo.id", id);
            let written = state
                .todo_store()
                .delete(id)?
                .ok_or_else(|| OperationError::not_found(NOT_FOUND))?;
            state.publish_todo_stats(written.stats)?;
            Ok(())
        },
    )?;
    Ok(StatusCode::NO_CONTENT)
}
