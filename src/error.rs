//! Error types for Keymeter
//!
//! Every failure the key registry, usage meter, or generation layer can
//! produce is an `AppError`. Handlers return them directly and the
//! `IntoResponse` impl renders the JSON error body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("API key is required")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Monthly usage limit exceeded")]
    QuotaExceeded { limit: u64, usage: u64 },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the failure came from the backing store.
    ///
    /// Storage failures are the only ones a caller may retry; an increment
    /// retry must carry a request id to stay idempotent.
    pub fn is_storage(&self) -> bool {
        matches!(self, AppError::Storage(_) | AppError::RedisError(_))
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

/// Machine-readable counters attached to quota errors
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub limit: u64,
    pub usage: u64,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),
            AppError::MissingApiKey => (
                StatusCode::UNAUTHORIZED,
                "API_KEY_REQUIRED",
                self.to_string(),
                None,
            ),
            AppError::InvalidApiKey => (
                StatusCode::FORBIDDEN,
                "INVALID_API_KEY",
                self.to_string(),
                None,
            ),
            AppError::QuotaExceeded { limit, usage } => (
                StatusCode::TOO_MANY_REQUESTS,
                "QUOTA_EXCEEDED",
                self.to_string(),
                Some(ErrorDetails {
                    limit: *limit,
                    usage: *usage,
                }),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                msg.clone(),
                None,
            ),
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                msg.clone(),
                None,
            ),
            AppError::GenerationFailed(_) | AppError::HttpError(_) => (
                StatusCode::BAD_GATEWAY,
                "GENERATION_FAILED",
                "Failed to generate formula".to_string(),
                None,
            ),
            AppError::Storage(_) | AppError::RedisError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE_ERROR",
                "Storage service error".to_string(),
                None,
            ),
            AppError::JsonError(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_JSON",
                "Invalid JSON in request".to_string(),
                None,
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
