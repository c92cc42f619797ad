//! Error handling for the limitd service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::fmt;

pub type LimitdResult<T> = Result<T, LimitdError>;

/// Errors that can occur in the limitd service
#[derive(Debug, Clone)]
pub enum LimitdError {
    /// Redis connection or command error
    Redis(String),
    /// A store round trip exceeded its deadline; the verdict is unknown
    Timeout(String),
    /// Registration payload failed validation
    Validation(String),
    /// Configuration error
    Config(String),
    /// Serialization/deserialization error
    Serialization(String),
    /// Unexpected store reply or other programmer bug
    Internal(String),
}

impl fmt::Display for LimitdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitdError::Redis(msg) => write!(f, "Redis error: {}", msg),
            LimitdError::Timeout(msg) => write!(f, "Deadline exceeded: {}", msg),
            LimitdError::Validation(msg) => write!(f, "Validation error: {}", msg),
            LimitdError::Config(msg) => write!(f, "Configuration error: {}", msg),
            LimitdError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            LimitdError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for LimitdError {}

impl From<redis::RedisError> for LimitdError {
    fn from(error: redis::RedisError) -> Self {
        LimitdError::Redis(error.to_string())
    }
}

impl From<deadpool_redis::PoolError> for LimitdError {
    fn from(error: deadpool_redis::PoolError) -> Self {
        match error {
            deadpool_redis::PoolError::Timeout(_) => {
                LimitdError::Timeout("timed out waiting for a pool connection".to_string())
            }
            other => LimitdError::Redis(format!("connection pool: {}", other)),
        }
    }
}

impl From<serde_json::Error> for LimitdError {
    fn from(error: serde_json::Error) -> Self {
        LimitdError::Serialization(error.to_string())
    }
}

impl IntoResponse for LimitdError {
    fn into_response(self) -> Response {
        let status = match &self {
            LimitdError::Validation(_) => StatusCode::BAD_REQUEST,
            LimitdError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            LimitdError::Redis(_)
            | LimitdError::Config(_)
            | LimitdError::Serialization(_)
            | LimitdError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_reason() {
        let err = LimitdError::Validation("limit must be positive".to_string());
        assert_eq!(err.to_string(), "Validation error: limit must be positive");
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let resp = LimitdError::Timeout("check timed out".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
