//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use bakery_allocator::AllocError;
use bakery_orchestrator::OrchestratorError;
use bakery_state::StoreError;

/// Errors surfaced by the control API. Every variant renders as
/// `{"error": string}` with the status below.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad input shape or value → 400.
    #[error("{0}")]
    InvalidArgument(String),

    /// Unknown pie or slice → 404.
    #[error("{0}")]
    NotFound(String),

    /// Pie slug already taken → 409.
    #[error("{0}")]
    SlugConflict(String),

    /// Any other uniqueness violation → 400.
    #[error("{0}")]
    Conflict(String),

    /// Unexpected store or I/O failure → 400, logged.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SlugConflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "internal error surfaced to client");
                StatusCode::BAD_REQUEST
            }
            ApiError::InvalidArgument(_) | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(message) => ApiError::NotFound(message),
            StoreError::Conflict(message) => ApiError::Conflict(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AllocError> for ApiError {
    fn from(e: AllocError) -> Self {
        // Both allocator failures are client-visible 400s; exhaustion keeps
        // its exact message.
        ApiError::InvalidArgument(e.to_string())
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Store(e) => e.into(),
            OrchestratorError::Alloc(e) => e.into(),
        }
    }
}
