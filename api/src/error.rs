//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use shared::OperationError;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type.
    pub error: String,
    /// Detailed error message.
    pub message: String,
}

/// An `OperationError` rendered as an HTTP response.
///
/// Unexpected failures never leak their message to the client.
#[derive(Debug)]
pub struct ApiError(pub OperationError);

impl From<OperationError> for ApiError {
    fn from(err: OperationError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self.0 {
            OperationError::Validation(message) => {
                (StatusCode::BAD_REQUEST, "validation_failed", message)
            }
            OperationError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            OperationError::Unexpected(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".to_string(),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
                message,
            }),
        )
            .into_response()
    }
}
