//! Audit record construction
//!
//! Combines the request context and the classifier output into an
//! [`ErrorRecord`], drawing the id from the injected generator.

use actix_web::http::StatusCode;
use actix_web::HttpRequest;
use chrono::Utc;
use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::classifier::ClassifiedError;
use crate::config::SettingsError;
use crate::error::AppError;
use crate::id_generator::IdGenerator;
use crate::models::ErrorRecord;

/// Read-only view of the request that failed
pub trait RequestContext {
    fn method_name(&self) -> &str;
    /// Request URI as observed, including the query string
    fn path(&self) -> Cow<'_, str>;
}

impl RequestContext for HttpRequest {
    fn method_name(&self) -> &str {
        self.method().as_str()
    }

    fn path(&self) -> Cow<'_, str> {
        Cow::Owned(self.uri().to_string())
    }
}

/// Owned request context, detached from any live request
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: String,
    pub path: String,
}

impl RequestSnapshot {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }
}

impl RequestContext for RequestSnapshot {
    fn method_name(&self) -> &str {
        &self.method
    }

    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.path)
    }
}

/// Builds audit records for one application
#[derive(Clone)]
pub struct RecordBuilder {
    ids: Arc<dyn IdGenerator>,
    application_name: Arc<str>,
}

impl RecordBuilder {
    /// Every record must name its application, so an empty name is refused.
    pub fn new(
        ids: Arc<dyn IdGenerator>,
        application_name: impl Into<Arc<str>>,
    ) -> Result<Self, SettingsError> {
        let application_name = application_name.into();
        if application_name.is_empty() {
            return Err(SettingsError::MissingApplicationName);
        }

        Ok(Self {
            ids,
            application_name,
        })
    }

    pub fn build(&self, request: &dyn RequestContext, classified: &ClassifiedError<'_>) -> ErrorRecord {
        // Not-found traces carry no diagnostic value.
        let trace = (classified.status != StatusCode::NOT_FOUND).then(|| render_trace(classified));

        ErrorRecord::new(
            self.ids.generate(),
            request.path().into_owned(),
            request.method_name().to_string(),
            classified.status.as_u16(),
            classified.reason.to_string(),
            classified.message.clone(),
            classified.exception_type.to_string(),
            trace,
            self.application_name.to_string(),
            Utc::now(),
        )
    }
}

/// Debug rendering of the error followed by its causal chain
pub fn render_trace(classified: &ClassifiedError<'_>) -> String {
    let mut trace = format!("{}: {:?}", classified.exception_type, classified.source);

    if let Some(app_error) = classified.source.as_error::<AppError>() {
        let mut cause = std::error::Error::source(app_error);
        while let Some(err) = cause {
            let _ = write!(trace, "\nCaused by: {}", err);
            cause = err.source();
        }
    }

    trace
}
