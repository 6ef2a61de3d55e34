//! Todo data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// A todo item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Identifier, unique within a store.
    pub id: u64,
    /// What needs doing.
    pub text: String,
    /// Whether the item is done.
    pub completed: bool,
    /// When the item was created.
    pub created_at: DateTime<Utc>,
}

impl Todo {
    /// Creates an open todo stamped with the current time.
    #[must_use]
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            completed: false,
            created_at: Utc::now(),
        }
    }
}

/// Request body for creating a todo.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewTodo {
    /// Text of the new item.
    #[validate(length(min = 1, message = "Todo text is required"))]
    pub text: String,
}

/// Partial update of a todo. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPatch {
    /// Replacement text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Replacement completion flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

/// Errors that can occur during todo validation.
#[derive(Debug, Error)]
pub enum TodoValidationError {
    /// The text is empty or whitespace only.
    #[error("Todo text is required")]
    BlankText,

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

impl NewTodo {
    /// Creates a request for the given text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is empty or whitespace only.
    pub fn validate_new(&self) -> Result<(), TodoValidationError> {
        if self.text.trim().is_empty() {
            return Err(TodoValidationError::BlankText);
        }
        self.validate()?;
        Ok(())
    }
}

impl TodoPatch {
    /// Creates a patch that only sets the completion flag.
    #[must_use]
    pub fn completed(completed: bool) -> Self {
        Self {
            text: None,
            completed: Some(completed),
        }
    }

    /// Validates the patch.
    ///
    /// # Errors
    ///
    /// Returns an error if replacement text is provided but blank.
    pub fn validate_patch(&self) -> Result<(), TodoValidationError> {
        match &self.text {
            Some(text) if text.trim().is_empty() => Err(TodoValidationError::BlankText),
            _ => Ok(()),
        }
    }

    /// Applies the patch to a todo.
    pub fn apply(&self, todo: &mut Todo) {
        if let Some(text) = &self.text {
            todo.text.clone_from(text);
        }
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_todo_serializes_camel_case() {
        let todo = Todo::new(1, "Example Todo");
        let value = serde_json::to_value(&todo).unwrap();

        assert_eq!(value["id"], 1);
        assert_eq!(value["text"], "Example Todo");
        assert_eq!(value["completed"], false);
        assert!(value["createdAt"].is_string());
    }

    #[test]
    fn test_new_todo_validation() {
        assert!(NewTodo::new("Buy milk").validate_new().is_ok());
        assert!(matches!(
            NewTodo::new("").validate_new(),
            Err(TodoValidationError::BlankText)
        ));
        assert!(matches!(
            NewTodo::new("   \t").validate_new(),
            Err(TodoValidationError::BlankText)
        ));
    }

    #[test]
    fn test_patch_validation() {
        assert!(TodoPatch::default().validate_patch().is_ok());
        assert!(TodoPatch::completed(true).validate_patch().is_ok());

        let blank = TodoPatch {
            text: Some("  ".to_string()),
            completed: None,
        };
        assert!(matches!(
            blank.validate_patch(),
            Err(TodoValidationError::BlankText)
        ));
    }

    #[test]
    fn test_patch_apply() {
        let mut todo = Todo::new(3, "Old");

        TodoPatch {
            text: Some("New".to_string()),
            completed: None,
        }
        .apply(&mut todo);
        assert_eq!(todo.text, "New");
        assert!(!todo.completed);

        TodoPatch::completed(true).apply(&mut todo);
        assert_eq!(todo.text, "New");
        assert!(todo.completed);
    }

    #[test]
    fn test_patch_deserialization_defaults() {
        let patch: TodoPatch = serde_json::from_str(r#"{"completed": true}"#).unwrap();
        assert_eq!(patch, TodoPatch::completed(true));

        let patch: TodoPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(patch, TodoPatch::default());
    }
}
