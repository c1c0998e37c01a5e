/// Unified error types for Find Connections
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum AppError {
    /// No session, or the session could not be verified
    #[error("{0}")]
    Unauthenticated(String),

    /// Authenticated with the wrong role, or a failed CSRF check
    #[error("{0}")]
    Forbidden(String),

    /// Confirmation, reset or session token is malformed, forged or expired
    #[error("{0}")]
    InvalidToken(String),

    /// Bad input shape or a rejected upload
    #[error("{0}")]
    Validation(String),

    /// Required request fields are absent
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Optimistic-concurrency loss
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    RateLimited(String),

    /// Source address is temporarily banned
    #[error("{0}")]
    Banned(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failures talking to the graph store, object store, mail server or scanner
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    /// HTTP status and stable error code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::InvalidToken(_) => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::MissingFields(_) => (StatusCode::BAD_REQUEST, "MISSING_REQUIRED_FIELDS"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::AlreadyExists(_) => (StatusCode::CONFLICT, "ALREADY_EXISTS"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            AppError::Banned(_) => (StatusCode::TOO_MANY_REQUESTS, "BANNED"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AppError::ExternalService(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "EXTERNAL_SERVICE_ERROR")
            }
            AppError::Internal(_) | AppError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }

    pub fn unauthenticated() -> Self {
        AppError::Unauthenticated("Not authenticated".to_string())
    }

    pub fn forbidden() -> Self {
        AppError::Forbidden("Not authorized".to_string())
    }

    pub fn missing(fields: &[&str]) -> Self {
        AppError::MissingFields(fields.iter().map(|f| f.to_string()).collect())
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let (message, details) = match &self {
            AppError::Database(_)
            | AppError::ExternalService(_)
            | AppError::Internal(_)
            | AppError::Io(_) => {
                tracing::error!(code, error = %self, "request failed");
                // Don't leak details
                ("Internal server error".to_string(), None)
            }
            AppError::MissingFields(fields) => {
                (self.to_string(), Some(serde_json::json!({ "fields": fields })))
            }
            _ => {
                tracing::debug!(code, error = %self, "request rejected");
                (self.to_string(), None)
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type AppResult<T> = Result<T, AppError>;
