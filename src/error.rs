//! Centralized error handling module
//!
//! Errors raised by request handlers. Every variant carries enough
//! information for the error pipeline to classify it; the pipeline is the
//! only place that renders them to clients.

use actix_web::{http::StatusCode, ResponseError};
use thiserror::Error;

/// Application-wide error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Request body or field-level validation failed
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Explicit status with an optional reason, for statuses without a
    /// dedicated variant
    #[error("{status}{}", reason_suffix(.reason))]
    Status {
        status: StatusCode,
        reason: Option<String>,
    },

    /// Implementation fault
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Status and reason text for errors that declare their own status.
    ///
    /// Validation failures and internal faults return `None`.
    pub fn declared_status(&self) -> Option<(StatusCode, Option<&str>)> {
        match self {
            AppError::NotFound(reason) => Some((StatusCode::NOT_FOUND, Some(reason.as_str()))),
            AppError::BadRequest(reason) => Some((StatusCode::BAD_REQUEST, Some(reason.as_str()))),
            AppError::Unauthorized(reason) => {
                Some((StatusCode::UNAUTHORIZED, Some(reason.as_str())))
            }
            AppError::Conflict(reason) => Some((StatusCode::CONFLICT, Some(reason.as_str()))),
            AppError::Status { status, reason } => Some((*status, reason.as_deref())),
            AppError::ValidationError(_) | AppError::Internal(_) => None,
        }
    }

    /// Name recorded as the audit record's exception type
    pub fn type_name(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "AppError::ValidationError",
            AppError::NotFound(_) => "AppError::NotFound",
            AppError::BadRequest(_) => "AppError::BadRequest",
            AppError::Unauthorized(_) => "AppError::Unauthorized",
            AppError::Conflict(_) => "AppError::Conflict",
            AppError::Status { .. } => "AppError::Status",
            AppError::Internal(_) => "AppError::Internal",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => self
                .declared_status()
                .map(|(status, _)| status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;
