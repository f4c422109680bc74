use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::queue::QueueError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid parameters: {}", .0.join("; "))]
    InvalidParameter(Vec<String>),

    #[error("{0}")]
    SourceTooLarge(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session is closed: {0}")]
    SessionClosed(String),

    #[error("Language not found: {0}")]
    LanguageNotFound(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("{reason}")]
    RateLimited { reason: String, retry_after: u64 },

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
            AppError::InvalidParameter(violations) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": format!("Invalid parameters: {}", violations.join("; ")),
                    "violations": violations,
                }),
            ),
            AppError::SourceTooLarge(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::SessionNotFound(id) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("Session '{}' not found", id) }),
            ),
            AppError::SessionClosed(id) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": format!("Session '{}' is closed", id) }),
            ),
            AppError::LanguageNotFound(id) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("Language '{}' not found", id) }),
            ),
            AppError::ExecutionNotFound(id) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("Execution '{}' not found", id) }),
            ),
            AppError::RateLimited {
                reason,
                retry_after,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": reason, "retryAfter": retry_after }),
            ),
            AppError::Queue(e) => {
                tracing::error!("Queue error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
