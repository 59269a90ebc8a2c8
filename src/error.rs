//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use opentelemetry::KeyValue;
use serde_json::json;
use thiserror::Error;

use crate::observability::add_attributes;
use crate::storage::StorageError;

/// Failure details carried on a response for the error-tracing stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    pub kind: &'static str,
    pub message: String,
    pub status: StatusCode,
}

impl RequestFailure {
    /// Build a JSON error response carrying this failure as an extension.
    pub fn into_response_with(self, body: serde_json::Value) -> Response {
        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// Error returned by request handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A required field was missing or malformed.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Validation(message) => {
                add_attributes([
                    KeyValue::new("validation.failed", true),
                    KeyValue::new("validation.message", message.clone()),
                ]);
                (status, Json(json!({ "error": message }))).into_response()
            }
            Self::Storage(err) => {
                let message = err.to_string();
                tracing::error!(kind = err.kind(), error = %message, "Request failed");
                RequestFailure {
                    kind: err.kind(),
                    message: message.clone(),
                    status,
                }
                .into_response_with(json!({ "error": message }))
            }
        }
    }
}
