use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use joblib::errors::JobError;
use serde_json::json;

/// Error type of the HTTP handlers, rendered as `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The path did not name a job id at all.
    #[error("job {0} not found")]
    UnknownJob(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Job(err) if err.is_not_found() => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
            }
            AppError::Job(JobError::EmptyArgs) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", self.to_string())
            }
            AppError::Job(err) => {
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "an internal error occurred".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::UnknownJob(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });
        (status, axum::Json(body)).into_response()
    }
}
