//! Failure taxonomy shared by every instrumented business action.

use crate::models::TodoValidationError;
use crate::storage::TodoStoreError;
use crate::telemetry::{LogSinkError, MetricsError};
use thiserror::Error;

/// Outcome of a failed business action.
///
/// The instrumentation layer classifies failures by variant (log level,
/// outcome label) but always hands the original error back to the caller.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Malformed or empty input.
    #[error("{0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Anything else.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl OperationError {
    /// Creates a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a not-found failure.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Returns the `outcome` label value recorded for this failure.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Unexpected(_) => "error",
        }
    }

    /// Returns true for failures the caller caused (validation, not found).
    #[must_use]
    pub fn is_expected(&self) -> bool {
        !matches!(self, Self::Unexpected(_))
    }
}

impl From<TodoValidationError> for OperationError {
    fn from(err: TodoValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<TodoStoreError> for OperationError {
    fn from(err: TodoStoreError) -> Self {
        Self::Unexpected(err.into())
    }
}

impl From<MetricsError> for OperationError {
    fn from(err: MetricsError) -> Self {
        Self::Unexpected(err.into())
    }
}

impl From<LogSinkError> for OperationError {
    fn from(err: LogSinkError) -> Self {
        Self::Unexpected(err.into())
    }
}
