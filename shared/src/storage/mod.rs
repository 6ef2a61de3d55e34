//! Storage traits and implementations.
//!
//! The `TodoStore` trait defines the interface for todo storage, allowing
//! different implementations behind the API server.

pub mod todo_store;

pub use todo_store::{InMemoryTodoStore, StoreWrite, TodoStats, TodoStore, TodoStoreError};
