//! Uncaught error pipeline
//!
//! Every error that reaches the app boundary (handler errors, extractor
//! failures, unmatched routes) goes through [`ErrorPipeline::handle`]:
//! classify, build the audit record, render the response, hand the record
//! to the audit writer and log locally. Nothing propagates past it.

use actix_web::body::{BoxBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::error::InternalError;
use actix_web::{web, Error, HttpResponse};
use std::fmt;
use std::sync::Arc;
use tracing::{error, trace, warn};

use crate::classifier::{classify, ClassifiedError};
use crate::config::SettingsError;
use crate::id_generator::IdGenerator;
use crate::record::{RecordBuilder, RequestContext, RequestSnapshot};
use crate::renderer::render;
use crate::sink::AuditDispatcher;

/// Progress of one error through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Classified,
    RecordBuilt,
    Persisting { submitted: bool },
    Responded,
    LocalLogged,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Received => write!(f, "received"),
            Stage::Classified => write!(f, "classified"),
            Stage::RecordBuilt => write!(f, "record_built"),
            Stage::Persisting { submitted: true } => write!(f, "persisting"),
            Stage::Persisting { submitted: false } => write!(f, "persisting_failed"),
            Stage::Responded => write!(f, "responded"),
            Stage::LocalLogged => write!(f, "local_logged"),
        }
    }
}

/// Terminal handler for request errors
#[derive(Clone)]
pub struct ErrorPipeline {
    builder: RecordBuilder,
    dispatcher: AuditDispatcher,
}

impl ErrorPipeline {
    pub fn new(
        ids: Arc<dyn IdGenerator>,
        dispatcher: AuditDispatcher,
        application_name: impl Into<Arc<str>>,
    ) -> Result<Self, SettingsError> {
        Ok(Self {
            builder: RecordBuilder::new(ids, application_name)?,
            dispatcher,
        })
    }

    /// Turn an error into the client response.
    ///
    /// The audit write is only submitted here; its outcome never changes
    /// the response.
    pub fn handle(&self, request: &dyn RequestContext, error: &Error) -> HttpResponse {
        advance(Stage::Received, None);

        let classified = classify(error);
        advance(Stage::Classified, None);

        let record = self.builder.build(request, &classified);
        let error_id = record.id();
        advance(Stage::RecordBuilt, Some(error_id));

        let response = render(&record);
        let submitted = self.dispatcher.submit(record).is_ok();
        advance(Stage::Persisting { submitted }, Some(error_id));
        advance(Stage::Responded, Some(error_id));

        log_error(request, &classified, error_id);
        advance(Stage::LocalLogged, Some(error_id));

        response
    }
}

fn advance(stage: Stage, error_id: Option<u64>) {
    trace!(stage = %stage, error_id, "Error pipeline stage");
}

/// `error` for 5xx, `warn` otherwise. Declared errors log their status and
/// reason; anything else logs the full error.
fn log_error(request: &dyn RequestContext, classified: &ClassifiedError<'_>, error_id: u64) {
    let method = request.method_name();
    let uri = request.path();
    let status = classified.status.as_u16();
    let server_error = classified.status.is_server_error();

    match (classified.is_declared(), server_error) {
        (true, true) => error!(
            error_id, %method, %uri, status, reason = classified.reason,
            "Failed to handle request [{} {}]", method, uri
        ),
        (true, false) => warn!(
            error_id, %method, %uri, status, reason = classified.reason,
            "Failed to handle request [{} {}]", method, uri
        ),
        (false, true) => error!(
            error_id, %method, %uri, status, error = ?classified.source,
            "Failed to handle request [{} {}]: {}", method, uri, classified.message
        ),
        (false, false) => warn!(
            error_id, %method, %uri, status, error = ?classified.source,
            "Failed to handle request [{} {}]: {}", method, uri, classified.message
        ),
    }
}

/// Middleware routing every error response through the app's
/// [`ErrorPipeline`].
///
/// Register the pipeline as `web::Data<ErrorPipeline>` and wrap the app with
/// `middleware::from_fn(capture_errors)` as the innermost middleware.
pub async fn capture_errors(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let Some(pipeline) = req.app_data::<web::Data<ErrorPipeline>>().cloned() else {
        warn!("No error pipeline registered, passing response through");
        return next.call(req).await.map(ServiceResponse::map_into_boxed_body);
    };
    // Routing needs sole ownership of the request; keep only an owned copy.
    let request = RequestSnapshot::new(req.method().as_str(), req.uri().to_string());

    match next.call(req).await {
        Ok(res) => {
            let Some(error) = res.response().error() else {
                return Ok(res.map_into_boxed_body());
            };
            let response = pipeline.handle(&request, error);
            Ok(res.into_response(response))
        }
        Err(error) => {
            let response = pipeline.handle(&request, &error);
            Err(InternalError::from_response(error.to_string(), response).into())
        }
    }
}
