//! Status classification for uncaught request errors
//!
//! Maps any `actix_web::Error` to a status, its reason phrase and a detail
//! message. Declared statuses win, binding/validation failures become 400,
//! and everything else is a 500. Classification cannot fail.

use actix_web::error::{
    InternalError, JsonPayloadError, PathError, PayloadError, QueryPayloadError, UrlencodedError,
};
use actix_web::http::StatusCode;
use actix_web::Error;
use std::borrow::Cow;

use crate::error::AppError;

/// Phrase used for statuses that have no canonical reason
pub const UNKNOWN_REASON: &str = "Unknown Status";

/// Recorded type for foreign errors nothing more is known about
pub const FOREIGN_ERROR_TYPE: &str = "actix_web::Error";

/// How an error was recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The error carried its own status
    Declared,
    /// Request binding or field validation failed
    Validation,
    /// Anything else
    Unexpected,
}

/// Classifier output, still borrowing the error it describes
#[derive(Debug)]
pub struct ClassifiedError<'a> {
    pub status: StatusCode,
    pub reason: &'static str,
    pub message: String,
    pub exception_type: Cow<'static, str>,
    pub category: ErrorCategory,
    pub source: &'a Error,
}

impl ClassifiedError<'_> {
    pub fn is_declared(&self) -> bool {
        self.category == ErrorCategory::Declared
    }
}

/// Canonical phrase for a status
pub fn reason_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or(UNKNOWN_REASON)
}

/// Classify an error; first matching rule wins.
pub fn classify(error: &Error) -> ClassifiedError<'_> {
    if let Some(app_error) = error.as_error::<AppError>() {
        return classify_app_error(error, app_error);
    }

    let status = error.as_response_error().status_code();
    let exception_type = foreign_type_name(error);

    // Size limits and encoding faults keep the status actix reports.
    if status == StatusCode::BAD_REQUEST && is_binding_failure(error) {
        return classified(error, status, error.to_string(), exception_type, ErrorCategory::Validation);
    }

    if status != StatusCode::INTERNAL_SERVER_ERROR {
        return classified(error, status, error.to_string(), exception_type, ErrorCategory::Declared);
    }

    classified(
        error,
        StatusCode::INTERNAL_SERVER_ERROR,
        error.to_string(),
        exception_type,
        ErrorCategory::Unexpected,
    )
}

fn classify_app_error<'a>(error: &'a Error, app_error: &AppError) -> ClassifiedError<'a> {
    let exception_type = Cow::Borrowed(app_error.type_name());

    if let Some((status, reason)) = app_error.declared_status() {
        let message = match reason {
            Some(reason) => reason.to_string(),
            None => app_error.to_string(),
        };
        return classified(error, status, message, exception_type, ErrorCategory::Declared);
    }

    match app_error {
        AppError::ValidationError(description) => classified(
            error,
            StatusCode::BAD_REQUEST,
            description.clone(),
            exception_type,
            ErrorCategory::Validation,
        ),
        _ => classified(
            error,
            StatusCode::INTERNAL_SERVER_ERROR,
            app_error.to_string(),
            exception_type,
            ErrorCategory::Unexpected,
        ),
    }
}

/// Extractor errors raised while binding the request to handler arguments
fn is_binding_failure(error: &Error) -> bool {
    if let Some(e) = error.as_error::<JsonPayloadError>() {
        return !matches!(e, JsonPayloadError::Serialize(_));
    }

    error.as_error::<PathError>().is_some()
        || error.as_error::<QueryPayloadError>().is_some()
        || error.as_error::<UrlencodedError>().is_some()
}

/// Concrete type of a foreign error.
///
/// Falls back to the leading name of its `Debug` output, then to
/// [`FOREIGN_ERROR_TYPE`].
fn foreign_type_name(error: &Error) -> Cow<'static, str> {
    let known = if error.as_error::<JsonPayloadError>().is_some() {
        Some("actix_web::error::JsonPayloadError")
    } else if error.as_error::<PathError>().is_some() {
        Some("actix_web::error::PathError")
    } else if error.as_error::<QueryPayloadError>().is_some() {
        Some("actix_web::error::QueryPayloadError")
    } else if error.as_error::<UrlencodedError>().is_some() {
        Some("actix_web::error::UrlencodedError")
    } else if error.as_error::<PayloadError>().is_some() {
        Some("actix_web::error::PayloadError")
    } else if error.as_error::<InternalError<&'static str>>().is_some()
        || error.as_error::<InternalError<String>>().is_some()
    {
        Some("actix_web::error::InternalError")
    } else {
        None
    };

    if let Some(name) = known {
        return Cow::Borrowed(name);
    }

    let debug = format!("{:?}", error.as_response_error());
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();

    if name.starts_with(|c: char| c.is_ascii_uppercase()) {
        Cow::Owned(name)
    } else {
        Cow::Borrowed(FOREIGN_ERROR_TYPE)
    }
}

fn classified<'a>(
    source: &'a Error,
    status: StatusCode,
    message: String,
    exception_type: Cow<'static, str>,
    category: ErrorCategory,
) -> ClassifiedError<'a> {
    ClassifiedError {
        status,
        reason: reason_phrase(status),
        message,
        exception_type,
        category,
        source,
    }
}
