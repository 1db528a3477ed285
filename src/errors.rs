//! Error taxonomy for the service boundary.
//!
//! Low layers return typed errors; the axum layer maps them to HTTP here.
//! 5xx responses carry only an opaque `error_id` — never a message, stack,
//! or SQL fragment.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    /// Duplicate idempotent key or already-recorded outcome. The payload
    /// carries the prior ack/outcome so the client can proceed.
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        body: serde_json::Value,
    },

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("dependency unavailable: {0}")]
    Dependency(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>, body: serde_json::Value) -> Self {
        Self::Conflict {
            message: message.into(),
            body,
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_id = uuid::Uuid::new_v4().to_string();
        match self {
            ApiError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "validation_error",
                    "field": field,
                    "detail": message,
                    "error_id": error_id,
                })),
            )
                .into_response(),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized", "error_id": error_id })),
            )
                .into_response(),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "forbidden", "error_id": error_id })),
            )
                .into_response(),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "not_found", "detail": what, "error_id": error_id })),
            )
                .into_response(),
            ApiError::Conflict { body, .. } => {
                (StatusCode::CONFLICT, Json(body)).into_response()
            }
            ApiError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after_secs.to_string())],
                Json(json!({
                    "error": "rate_limit_exceeded",
                    "retry_after_seconds": retry_after_secs,
                    "error_id": error_id,
                })),
            )
                .into_response(),
            ApiError::Dependency(dep) => {
                error!(error_id = %error_id, dependency = %dep, "dependency unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "dependency_unavailable", "error_id": error_id })),
                )
                    .into_response()
            }
            ApiError::Internal(err) => {
                error!(error_id = %error_id, error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal_error", "error_id": error_id })),
                )
                    .into_response()
            }
        }
    }
}
