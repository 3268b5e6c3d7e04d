use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::services::job_store::StoreError;
use crate::services::queue::QueueError;
use crate::services::storage::StorageError;

/// Error returned by HTTP handlers, rendered as `{"success": false, "error": ...}`.
///
/// Messages are meant for clients; backend details are logged, not returned.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn job_not_found() -> Self {
        ApiError::NotFound("Job not found".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::job_not_found(),
            StoreError::IllegalTransition(e) => ApiError::Conflict(e.to_string()),
            StoreError::Duplicate(_) => ApiError::Conflict("Job already exists".to_string()),
            StoreError::Database(e) => {
                tracing::error!(error = %e, "Job store unavailable");
                ApiError::Unavailable("Job store unavailable, try again later".to_string())
            }
            StoreError::Corrupt(e) => {
                tracing::error!(error = %e, "Corrupt job record");
                ApiError::Internal("Internal error".to_string())
            }
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        tracing::error!(error = %err, "Job queue unavailable");
        ApiError::Unavailable("Job queue unavailable, try again later".to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "Artifact store error");
        ApiError::Unavailable("Video storage unavailable, try again later".to_string())
    }
}
