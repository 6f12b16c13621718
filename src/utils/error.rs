//! Error Handling Utilities
//!
//! Crate-wide error taxonomy. Each service keeps its own error enum and
//! converts into [`AppError`] at the boundary.

use serde::Serialize;
use thiserror::Error;

/// Main application error type shared by every lifecycle operation
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Duplicate resources (e.g. an email that is already registered)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad credentials, throttled logins and invalid tokens at the login boundary
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found where disclosure is safe
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid or expired tokens at the reset/verify boundary
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Store or transport failures
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AppError {
    /// Stable machine-readable code for client branching
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Conflict(_) => "CONFLICT",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Database(_) | AppError::Internal(_) | AppError::Configuration(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// HTTP status an outer transport layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Conflict(_) => 409,
            AppError::Unauthorized(_) => 401,
            AppError::NotFound(_) => 404,
            AppError::BadRequest(_) => 400,
            AppError::Database(_) | AppError::Internal(_) | AppError::Configuration(_) => 500,
        }
    }

    /// Message that is safe to show to a client
    pub fn public_message(&self) -> String {
        match self {
            AppError::Conflict(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg) => msg.clone(),
            AppError::Database(_) => "A database error occurred".to_string(),
            AppError::Internal(_) => "An internal server error occurred".to_string(),
            AppError::Configuration(_) => "Server configuration error".to_string(),
        }
    }
}

/// Standard error body for an outer transport layer
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            reason: None,
        }
    }

    pub fn with_reason(error: &str, message: &str, reason: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            reason: Some(reason.to_string()),
        }
    }
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        ErrorResponse::new(err.error_code(), &err.public_message())
    }
}

/// Result type alias for operations that can return AppError
pub type AppResult<T> = Result<T, AppError>;

/// Returns true when a database error is a violation of the named unique constraint
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(AppError::Conflict("x".into()).error_code(), "CONFLICT");
        assert_eq!(AppError::Unauthorized("x".into()).error_code(), "UNAUTHORIZED");
        assert_eq!(AppError::NotFound("x".into()).error_code(), "NOT_FOUND");
        assert_eq!(AppError::BadRequest("x".into()).error_code(), "BAD_REQUEST");
        assert_eq!(AppError::Internal("x".into()).error_code(), "INTERNAL_ERROR");
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).error_code(),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Conflict("x".into()).status_code(), 409);
        assert_eq!(AppError::Unauthorized("x".into()).status_code(), 401);
        assert_eq!(AppError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(AppError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let error = AppError::Internal("connection refused to 10.0.0.3".into());
        let response = ErrorResponse::from(&error);
        assert_eq!(response.error, "INTERNAL_ERROR");
        assert!(!response.message.contains("10.0.0.3"));
    }

    #[test]
    fn test_error_response_with_reason() {
        let error = ErrorResponse::with_reason("UNAUTHORIZED", "Invalid credentials", "INVALID_CREDENTIALS");
        assert_eq!(error.reason.as_deref(), Some("INVALID_CREDENTIALS"));

        let json = serde_json::to_value(ErrorResponse::new("NOT_FOUND", "User not found")).unwrap();
        assert!(json.get("reason").is_none());
    }
}
