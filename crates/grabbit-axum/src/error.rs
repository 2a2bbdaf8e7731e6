//! HTTP error type and mappings.
//!
//! Client errors come back as 4xx with an `{error}` body and never mutate
//! state; storage faults are 5xx. Worker-local failures never surface here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use grabbit_core::StorageError;
use grabbit_download::ExtractError;

/// Axum-facing error type.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<StorageError> for HttpError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::Constraint(msg) => Self::BadRequest(msg),
            StorageError::Backend(msg) => Self::Internal(format!("storage: {msg}")),
        }
    }
}

impl From<ExtractError> for HttpError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::NotInstalled => Self::ServiceUnavailable(err.to_string()),
            ExtractError::Storage(e) => e.into(),
            ExtractError::Unsupported
            | ExtractError::Unavailable
            | ExtractError::Restricted(_)
            | ExtractError::Timeout
            | ExtractError::Other(_) => Self::BadRequest(err.to_string()),
        }
    }
}
