//! Maps internal errors onto the HTTP surface. User-visible messages never
//! carry internal paths, stack frames, or credentials (§7 propagation
//! policy) — only `OrchError`'s own `Display`, which is already scrubbed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orch_core::error::OrchError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let body = ErrorBody {
            error: kind.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<OrchError> for ApiError {
    fn from(err: OrchError) -> Self {
        match err {
            OrchError::NotFound(msg) => ApiError::NotFound(msg),
            OrchError::Validation(msg) | OrchError::Planning(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
