use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("rate limit exceeded")]
    RateLimited {
        retry_after: Duration,
        limit: u32,
        limit_type: &'static str,
    },

    #[error("inference server unavailable")]
    UpstreamUnavailable,

    #[error("{0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_type: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED"),
            ApiError::UpstreamUnavailable => (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorBody {
            error: self.to_string(),
            code,
            retry_after: match &self {
                ApiError::RateLimited { retry_after, .. } => Some(retry_after.as_secs()),
                _ => None,
            },
            limit: match &self {
                ApiError::RateLimited { limit, .. } => Some(*limit),
                _ => None,
            },
            limit_type: match &self {
                ApiError::RateLimited { limit_type, .. } => Some(*limit_type),
                _ => None,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after, limit, .. } = &self {
            let headers = response.headers_mut();
            if let Ok(value) = header::HeaderValue::from_str(&retry_after.as_secs().to_string()) {
                headers.insert(header::RETRY_AFTER, value);
            }
            if let Ok(value) = header::HeaderValue::from_str(&limit.to_string()) {
                headers.insert("x-ratelimit-limit", value);
            }
            let reset = chrono::Utc::now().timestamp() + retry_after.as_secs() as i64;
            if let Ok(value) = header::HeaderValue::from_str(&reset.to_string()) {
                headers.insert("x-ratelimit-reset", value);
            }
        }
        response
    }
}
