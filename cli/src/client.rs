//! HTTP client for the Todoscope API.

use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use shared::models::{NewTodo, Todo, TodoPatch};
use shared::OperationError;
use thiserror::Error;

/// Errors returned by the API client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a non-success status.
    #[error("Server returned {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// The request could not be sent or the body could not be read.
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the expected JSON.
    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<ClientError> for OperationError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Http {
                status: 404,
                message,
            } => Self::NotFound(message),
            ClientError::Http {
                status: 400,
                message,
            } => Self::Validation(message),
            other => Self::Unexpected(other.into()),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client for the todo API.
#[derive(Debug, Clone)]
pub struct TodoClient {
    client: Client,
    api_url: String,
}

impl TodoClient {
    /// Creates a client for the server at `api_url`.
    #[must_use]
    pub fn new(api_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    async fn check(response: Response) -> Result<String, ClientError> {
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            return Ok(text);
        }

        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        Err(ClientError::Http {
            status: status.as_u16(),
            message,
        })
    }

    /// Fetches the health report.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server is unhealthy.
    pub async fn health(&self) -> Result<Value, ClientError> {
        let response = self.client.get(self.url("/health")).send().await?;
        Ok(serde_json::from_str(&Self::check(response).await?)?)
    }

    /// Fetches the Prometheus exposition.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn metrics_text(&self) -> Result<String, ClientError> {
        let response = self.client.get(self.url("/metrics")).send().await?;
        Self::check(response).await
    }

    /// Lists every todo.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list(&self) -> Result<Vec<Todo>, ClientError> {
        let response = self.client.get(self.url("/api/todos")).send().await?;
        Ok(serde_json::from_str(&Self::check(response).await?)?)
    }

    /// Creates a todo.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the text is rejected.
    pub async fn create(&self, text: &str) -> Result<Todo, ClientError> {
        let response = self
            .client
            .post(self.url("/api/todos"))
            .json(&NewTodo::new(text))
            .send()
            .await?;
        Ok(serde_json::from_str(&Self::check(response).await?)?)
    }

    /// Applies a patch to a todo.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the todo does not exist.
    pub async fn update(&self, id: u64, patch: &TodoPatch) -> Result<Todo, ClientError> {
        let response = self
            .client
            .put(self.url(&format!("/api/todos/{id}")))
            .json(patch)
            .send()
            .await?;
        Ok(serde_json::from_str(&Self::check(response).await?)?)
    }

    /// Deletes a todo.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the todo does not exist.
    pub async fn delete(&self, id: u64) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.url(&format!("/api/todos/{id}")))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
