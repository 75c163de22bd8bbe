//! Error types for the runbox server.

use std::path::PathBuf;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// IO error.
    #[error("IO error at {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// Engine error.
    #[error("Core error: {0}")]
    Core(#[from] runbox_core::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            message: e.to_string(),
        }
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Json(_) => (StatusCode::BAD_REQUEST, "invalid_json"),
            Self::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Self::Core(_) => (StatusCode::INTERNAL_SERVER_ERROR, "engine_error"),
        };

        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!("{} ({}): {}", status, code, message);
        } else {
            tracing::warn!("{} ({}): {}", status, code, message);
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
