//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reconciliation::ReconciliationError;
use saga::ServiceError;

/// Handler error rendered as `{"error": message}`.
#[derive(Debug)]
pub enum ApiError {
    /// A collaborator is down; the caller may retry.
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unavailable(msg) => {
                tracing::warn!(error = %msg, "collaborator unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<ReconciliationError> for ApiError {
    fn from(err: ReconciliationError) -> Self {
        match err {
            ReconciliationError::Store(ServiceError::Unavailable(_)) => {
                ApiError::Unavailable(err.to_string())
            }
            ReconciliationError::Store(_) => ApiError::Internal(err.to_string()),
        }
    }
}
