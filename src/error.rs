//! Error types for every layer and their mapping onto HTTP responses.
//!
//! Every failing response has the shape `{"success": false, "error": "..."}`.
//! Server-side failures only expose their message in debug builds.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Persistence layer errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to write {collection}: {source}")]
    Io {
        collection: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {collection}: {source}")]
    Serialize {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Text generation backend errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("LLM API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("No response from model '{model}'")]
    EmptyResponse { model: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// arXiv API errors
#[derive(Debug, Error)]
pub enum ArxivError {
    #[error("Failed to fetch papers for {topic}: {source}")]
    Http {
        topic: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("arXiv returned status {status} for {topic}")]
    Status { topic: String, status: u16 },

    #[error("Failed to read arXiv feed for {topic}: {source}")]
    Feed {
        topic: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to build arXiv client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Upload text extraction errors
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Unsupported file type: {0}")]
    Unsupported(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL for {var}: {value}")]
    InvalidUrl { var: &'static str, value: String },
}

/// Application-level errors returned by handlers
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("{0}")]
    UnsupportedFile(#[from] DocumentError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Arxiv(#[from] ArxivError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(resource: &'static str) -> Self {
        AppError::NotFound { resource }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::UnsupportedFile(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Store(_) | AppError::Arxiv(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        let body = if status.is_server_error() {
            tracing::error!(%message, error = ?self, "Server error");
            if cfg!(debug_assertions) {
                json!({
                    "success": false,
                    "error": message,
                    "details": format!("{:?}", self),
                })
            } else {
                json!({
                    "success": false,
                    "error": "Internal server error",
                })
            }
        } else {
            tracing::debug!(status = status.as_u16(), %message, "Client error");
            json!({
                "success": false,
                "error": message,
            })
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub type StoreResult<T> = Result<T, StoreError>;
