//! Data models for audit records, error envelopes and areas
//!
//! Defines the core data structures used throughout the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Audit record describing one handled request error.
///
/// Built once by the record builder and never mutated afterwards; the
/// `trace` is present exactly when `status` is not 404.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    id: u64,
    path: String,
    method_name: String,
    status: u16,
    error_phrase: String,
    message: String,
    exception_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
    application_name: String,
    timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        path: String,
        method_name: String,
        status: u16,
        error_phrase: String,
        message: String,
        exception_type: String,
        trace: Option<String>,
        application_name: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            path,
            method_name,
            status,
            error_phrase,
            message,
            exception_type,
            trace,
            application_name,
            timestamp,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn error_phrase(&self) -> &str {
        &self.error_phrase
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exception_type(&self) -> &str {
        &self.exception_type
    }

    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// JSON envelope returned to callers for every handled error.
///
/// The id is a string so JavaScript clients do not lose precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub error: String,
    pub id: String,
}

impl From<&ErrorRecord> for ErrorBody {
    fn from(record: &ErrorRecord) -> Self {
        Self {
            status: record.status,
            error: record.error_phrase.clone(),
            id: record.id.to_string(),
        }
    }
}

/// Administrative area (region) entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    /// Unique identifier, drawn from the gateway id generator
    #[serde(with = "id_as_string")]
    pub id: u64,

    pub name: String,

    /// Parent area, `None` for top-level regions
    #[serde(
        with = "optional_id_as_string",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub parent_id: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,

    /// Administrative division code
    pub area_code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,

    /// Materialized ancestor path (`root/child/...`), used to list
    /// descendants without recursion
    pub rule_id: String,
}

/// Input DTO for area registration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AreaInput {
    #[validate(length(min = 1, max = 64, message = "Name must be between 1 and 64 characters"))]
    pub name: String,

    #[validate(length(min = 2, max = 12, message = "Area code must be between 2 and 12 characters"))]
    pub area_code: String,

    #[validate(length(equal = 6, message = "Zip code must be exactly 6 characters"))]
    pub zip_code: Option<String>,

    pub parent_id: Option<u64>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub version: String,
    pub application: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub areas: usize,
}

mod id_as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

mod optional_id_as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match id {
            Some(id) => serializer.serialize_str(&id.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|id| id.parse().map_err(serde::de::Error::custom))
            .transpose()
    }
}
