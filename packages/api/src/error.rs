use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use db::StoreError;
use serde_json::json;

use crate::producer::SubmitError;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("Status store error: {0}")]
    Store(#[from] StoreError),

    /// Nothing is consuming the queue, so new jobs would never run.
    #[error("Dispatcher is {0}")]
    DispatcherStopped(&'static str),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Submit(SubmitError::InvalidParameter { .. }) => (
                StatusCode::BAD_REQUEST,
                "INVALID_PARAMETER",
                self.to_string(),
            ),
            AppError::Submit(err) => {
                tracing::error!(error = %err, "Failed to submit job");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SUBMIT_FAILED",
                    "The job could not be queued".to_string(),
                )
            }
            AppError::DispatcherStopped(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "DISPATCHER_STOPPED",
                self.to_string(),
            ),
            AppError::Store(err) => {
                tracing::error!(error = %err, "Failed to read job status");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STATUS_UNAVAILABLE",
                    "Job status is unavailable".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
