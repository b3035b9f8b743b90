use std::fmt;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    ValidationError(String),
    NotFound(String),
    Conflict(String),
    InsufficientFunds(String),
    InvalidOperation(String),
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            AppError::NotFound(msg) => write!(f, "Not found: {msg}"),
            AppError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            AppError::InsufficientFunds(msg) => write!(f, "Insufficient funds: {msg}"),
            AppError::InvalidOperation(msg) => write!(f, "Invalid operation: {msg}"),
            AppError::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Stable error type code (e.g., "VALIDATION_ERROR", "NOT_FOUND") for the
    /// transport layer sitting in front of the engine.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            AppError::InvalidOperation(_) => "INVALID_OPERATION",
            AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Human-readable message safe to hand back to a caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::InsufficientFunds(msg)
            | AppError::InvalidOperation(msg) => msg.clone(),
            AppError::InternalError(msg) => {
                // Log the actual error for debugging, but don't expose to client
                error!("Internal error: {msg}");
                "An internal error occurred".to_string()
            }
        }
    }

    /// Whether the caller can act on the error (everything except store failures).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::InternalError(_))
    }
}

// Convenience conversion from sqlx::Error
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::InternalError(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}
