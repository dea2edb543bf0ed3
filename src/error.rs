use std::time::Duration;

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::store::StoreError;

/// Invalid startup configuration. Fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid rate limiter settings: {0}")]
    InvalidLimiter(String),

    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("route {method} {pattern} is already registered")]
    RouteCollision { method: String, pattern: String },

    #[error("invalid port: {0}")]
    InvalidPort(u16),

    #[error("invalid allowed origin {0:?}")]
    InvalidOrigin(String),
}

/// Errors surfaced to API clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("too many requests, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("data store error: {0}")]
    Downstream(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Downstream(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Whole seconds, rounded up, never zero
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            Self::NotFound(msg) | Self::BadRequest(msg) => serde_json::json!({
                "error": msg,
                "status": status.as_u16(),
            }),
            Self::RateLimited { retry_after } => serde_json::json!({
                "error": "Too many requests, please try again later.",
                "status": status.as_u16(),
                "retry_after_secs": retry_after_secs(*retry_after),
            }),
            Self::Downstream(e) => {
                error!(error = %e, "data store failure");
                serde_json::json!({
                    "error": "Internal server error",
                    "status": status.as_u16(),
                })
            }
            Self::Internal(msg) => {
                error!(error = %msg, "internal error");
                serde_json::json!({
                    "error": "Internal server error",
                    "status": status.as_u16(),
                })
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after } = self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs(retry_after)),
            );
        }
        response
    }
}
