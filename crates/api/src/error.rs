//! Top-level HTTP error, the single point where component errors gain a status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use agentic_run_coordinator::CoordinatorError;
use agentic_run_store::StoreError;

use crate::types::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(run_id) => ApiError::NotFound(format!("run {run_id} not found")),
            StoreError::IllegalTransition { .. } => ApiError::Conflict(err.to_string()),
            StoreError::Conflict { .. } => ApiError::Internal(err.to_string()),
            StoreError::Backend(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(_) = &self {
            tracing::error!(error = %self, "internal error serving request");
        }
        let (status, detail) = match self {
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, detail),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        };
        (status, Json(ErrorResponse::new(detail))).into_response()
    }
}
