use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use batch_engine::BatchError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("queue is at capacity")]
    Overloaded,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("executor failed: {0}")]
    InferenceFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Validation(msg) => ApiError::Validation(msg),
            BatchError::Overloaded => ApiError::Overloaded,
            BatchError::DeadlineExceeded => ApiError::DeadlineExceeded,
            BatchError::InferenceFailed(msg) => ApiError::InferenceFailed(msg),
            BatchError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    detail: String,
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Overloaded => "OVERLOADED",
            ApiError::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ApiError::InferenceFailed(_) => "INFERENCE_FAILED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ApiError::InferenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
