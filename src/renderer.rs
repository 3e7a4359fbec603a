//! Error response rendering
//!
//! Only status, reason phrase and id leave the server; message and trace
//! stay in the audit record.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;

use crate::models::{ErrorBody, ErrorRecord};

pub const JSON_UTF8: &str = "application/json; charset=utf-8";

/// Render the `{status, error, id}` envelope for a record
pub fn render(record: &ErrorRecord) -> HttpResponse {
    let status =
        StatusCode::from_u16(record.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    HttpResponse::build(status)
        .content_type(JSON_UTF8)
        .json(ErrorBody::from(record))
}
