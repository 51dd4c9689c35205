//! Service error types
//!
//! Only input-shape problems cross the RPC boundary as errors. Failures
//! inside the analytical engines degrade to partial results and never
//! reach this type.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced to callers of the service
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed frame, missing column, unknown chart type, bad enum value
    #[error("{0}")]
    InvalidData(String),

    /// Unexpected internal failure (config, IO during startup)
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidData(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidData(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Result type alias for handler and service operations
pub type ApiResult<T> = Result<T, ApiError>;
