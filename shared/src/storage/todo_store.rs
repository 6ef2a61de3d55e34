//! Todo storage trait and implementations.
//!
//! Provides the `TodoStore` trait for abstracting todo storage operations
//! and an `InMemoryTodoStore` implementation.

use crate::models::{NewTodo, Todo, TodoPatch};
use std::sync::RwLock;
use thiserror::Error;

/// Errors that can occur during todo store operations.
#[derive(Debug, Error)]
pub enum TodoStoreError {
    /// Failed to acquire lock on the store.
    #[error("Failed to acquire lock on todo store")]
    LockError,
}

/// Counts of todos by completion state.
///
/// `revision` increases with every successful mutation, so of two stats the
/// one with the higher revision describes the later store contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TodoStats {
    /// All todos.
    pub total: usize,
    /// Todos not yet completed.
    pub active: usize,
    /// Completed todos.
    pub completed: usize,
    /// Mutation count at the time the stats were taken.
    pub revision: u64,
}

/// Result of a mutation together with the stats it left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreWrite<T> {
    /// Value produced by the mutation.
    pub value: T,
    /// Stats taken under the same lock as the mutation.
    pub stats: TodoStats,
}

/// Trait for todo storage implementations.
///
/// Implementations must be thread-safe (Send + Sync). Inputs are expected to
/// be validated by the caller. Every mutation reports the stats observed
/// atomically with it.
pub trait TodoStore: Send + Sync {
    /// Returns every todo in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn list(&self) -> Result<Vec<Todo>, TodoStoreError>;

    /// Creates a todo and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn create(&self, new_todo: NewTodo) -> Result<StoreWrite<Todo>, TodoStoreError>;

    /// Applies a patch. Returns `None` if no todo has the id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn update(&self, id: u64, patch: &TodoPatch)
        -> Result<Option<StoreWrite<Todo>>, TodoStoreError>;

    /// Removes a todo. Returns `None` if no todo has the id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn delete(&self, id: u64) -> Result<Option<StoreWrite<()>>, TodoStoreError>;

    /// Counts todos by completion state.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn stats(&self) -> Result<TodoStats, TodoStoreError>;
}

#[derive(Debug, Default)]
struct Contents {
    todos: Vec<Todo>,
    revision: u64,
}

impl Contents {
    fn stats(&self) -> TodoStats {
        let completed = self.todos.iter().filter(|t| t.completed).count();
        TodoStats {
            total: self.todos.len(),
            active: self.todos.len() - completed,
            completed,
            revision: self.revision,
        }
    }

    fn commit<T>(&mut self, value: T) -> StoreWrite<T> {
        self.revision += 1;
        StoreWrite {
            value,
            stats: self.stats(),
        }
    }
}

/// In-memory todo store. Nothing survives a restart.
///
/// Ids are one past the highest id currently stored.
#[derive(Debug, Default)]
pub struct InMemoryTodoStore {
    contents: RwLock<Contents>,
}

impl InMemoryTodoStore {
    /// Creates a new empty in-memory todo store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding a single example todo.
    #[must_use]
    pub fn with_example() -> Self {
        Self {
            contents: RwLock::new(Contents {
                todos: vec![Todo::new(1, "Example Todo")],
                revision: 0,
            }),
        }
    }
}

impl TodoStore for InMemoryTodoStore {
    fn list(&self) -> Result<Vec<Todo>, TodoStoreError> {
        let contents = self.contents.read().map_err(|_| TodoStoreError::LockError)?;
        Ok(contents.todos.clone())
    }

    fn create(&self, new_todo: NewTodo) -> Result<StoreWrite<Todo>, TodoStoreError> {
        let mut contents = self.contents.write().map_err(|_| TodoStoreError::LockError)?;
        let id = contents
            .todos
            .iter()
            .map(|t| t.id)
            .max()
            .map_or(1, |max| max + 1);
        let todo = Todo::new(id, new_todo.text);
        contents.todos.push(todo.clone());
        Ok(contents.commit(todo))
    }

    fn update(
        &self,
        id: u64,
        patch: &TodoPatch,
    ) -> Result<Option<StoreWrite<Todo>>, TodoStoreError> {
        let mut contents = self.contents.write().map_err(|_| TodoStoreError::LockError)?;
        let Some(todo) = contents.todos.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        patch.apply(todo);
        let todo = todo.clone();
        Ok(Some(contents.commit(todo)))
    }

    fn delete(&self, id: u64) -> Result<Option<StoreWrite<()>>, TodoStoreError> {
        let mut contents = self.contents.write().map_err(|_| TodoStoreError::LockError)?;
        let before = contents.todos.len();
        contents.todos.retain(|t| t.id != id);
        if contents.todos.len() == before {
            return Ok(None);
        }
        Ok(Some(contents.commit(())))
    }

    fn stats(&self) -> Result<TodoStats, TodoStoreError> {
        let contents = self.contents.read().map_err(|_| TodoStoreError::LockError)?;
        Ok(contents.stats())
    }
}
