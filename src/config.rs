//! Configuration management module
//!
//! Loads and validates environment-based configuration. Everything is read
//! once at startup and treated as immutable for the process lifetime.

use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::id_generator::MAX_NODE_ID;

/// Configuration errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid number format in environment variable {0}")]
    ParseError(&'static str),

    #[error("APPLICATION_NAME must be set to a non-empty value")]
    MissingApplicationName,

    #[error("AUDIT_NODE_ID {0} exceeds the maximum of 1023")]
    NodeIdOutOfRange(u16),

    #[error("Unknown audit store '{0}', expected 'memory' or 'postgres'")]
    UnknownStore(String),

    #[error("{key} must be a lowercase SQL identifier, got '{value}'")]
    InvalidIdentifier { key: &'static str, value: String },

    #[error("STORAGE_CONTACT_POINTS must name at least one host")]
    NoContactPoints,
}

/// Server configuration settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Identity of the owning service
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    /// Recorded on every audit record
    pub name: String,
}

/// Where audit records go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStore {
    Memory,
    Postgres,
}

/// Audit pipeline settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuditSettings {
    pub store: AuditStore,
    /// Records waiting for the writer before new ones are dropped
    pub queue_capacity: usize,
    /// Records kept by the in-memory store
    pub memory_capacity: usize,
    /// How long shutdown waits for pending writes
    pub shutdown_grace_ms: u64,
    /// Explicit id generator node discriminant
    pub node_id: Option<u16>,
}

impl AuditSettings {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Audit storage connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub contact_points: Vec<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: String,
    /// Schema holding the audit table
    pub keyspace: String,
    pub table: String,
    pub connect_timeout_ms: u64,
    /// Statement timeout applied to every audit insert
    pub read_timeout_ms: u64,
    pub pool_max_size: usize,
    /// Maximum wait for a pooled connection
    pub pool_timeout_ms: u64,
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub application: ApplicationSettings,
    pub audit: AuditSettings,
    pub storage: StorageSettings,
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let name = lookup("APPLICATION_NAME").unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err(SettingsError::MissingApplicationName);
        }

        let store = match var("AUDIT_STORE", "memory").to_ascii_lowercase().as_str() {
            "memory" => AuditStore::Memory,
            "postgres" => AuditStore::Postgres,
            other => return Err(SettingsError::UnknownStore(other.to_string())),
        };

        let node_id = match lookup("AUDIT_NODE_ID") {
            Some(raw) => {
                let node_id: u16 = raw
                    .parse()
                    .map_err(|_| SettingsError::ParseError("AUDIT_NODE_ID"))?;
                if node_id > MAX_NODE_ID {
                    return Err(SettingsError::NodeIdOutOfRange(node_id));
                }
                Some(node_id)
            }
            None => None,
        };

        let contact_points: Vec<String> = var("STORAGE_CONTACT_POINTS", "localhost")
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .collect();
        if contact_points.is_empty() {
            return Err(SettingsError::NoContactPoints);
        }

        Ok(Self {
            server: ServerSettings {
                host: var("SERVER_HOST", "0.0.0.0"),
                port: parse(&lookup, "SERVER_PORT", 8080)?,
            },
            application: ApplicationSettings { name },
            audit: AuditSettings {
                store,
                queue_capacity: parse(&lookup, "AUDIT_QUEUE_CAPACITY", 1024)?,
                memory_capacity: parse(&lookup, "AUDIT_MEMORY_CAPACITY", 1000)?,
                shutdown_grace_ms: parse(&lookup, "AUDIT_SHUTDOWN_GRACE_MS", 5000)?,
                node_id,
            },
            storage: StorageSettings {
                contact_points,
                port: parse(&lookup, "STORAGE_PORT", 5432)?,
                username: lookup("STORAGE_USERNAME"),
                password: lookup("STORAGE_PASSWORD"),
                database: var("STORAGE_DATABASE", "postgres"),
                keyspace: identifier("STORAGE_KEYSPACE", var("STORAGE_KEYSPACE", "gateway"))?,
                table: identifier("STORAGE_TABLE", var("STORAGE_TABLE", "k_error_log"))?,
                connect_timeout_ms: parse(&lookup, "STORAGE_CONNECT_TIMEOUT_MS", 5000)?,
                read_timeout_ms: parse(&lookup, "STORAGE_READ_TIMEOUT_MS", 5000)?,
                pool_max_size: parse(&lookup, "STORAGE_POOL_MAX_SIZE", 16)?,
                pool_timeout_ms: parse(&lookup, "STORAGE_POOL_TIMEOUT_MS", 2000)?,
            },
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, SettingsError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| SettingsError::ParseError(key)),
        None => Ok(default),
    }
}

/// Keyspace and table names are interpolated into SQL, so only plain
/// lowercase identifiers are accepted.
fn identifier(key: &'static str, value: String) -> Result<String, SettingsError> {
    let mut chars = value.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && value.len() <= 63;

    if valid {
        Ok(value)
    } else {
        Err(SettingsError::InvalidIdentifier { key, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_settings() {
        let settings = load(&[("APPLICATION_NAME", "solaka-gateway")]).unwrap();

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.application.name, "solaka-gateway");
        assert_eq!(settings.audit.store, AuditStore::Memory);
        assert_eq!(settings.audit.queue_capacity, 1024);
        assert_eq!(settings.audit.shutdown_grace(), Duration::from_secs(5));
        assert_eq!(settings.audit.node_id, None);
        assert_eq!(settings.storage.contact_points, vec!["localhost".to_string()]);
        assert_eq!(settings.storage.keyspace, "gateway");
        assert_eq!(settings.storage.table, "k_error_log");
    }

    #[test]
    fn test_custom_settings() {
        let settings = load(&[
            ("APPLICATION_NAME", "solaka-gateway"),
            ("SERVER_PORT", "3000"),
            ("AUDIT_STORE", "Postgres"),
            ("AUDIT_NODE_ID", "17"),
            ("STORAGE_CONTACT_POINTS", "db-1, db-2,,db-3"),
            ("STORAGE_POOL_MAX_SIZE", "4"),
        ])
        .unwrap();

        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.audit.store, AuditStore::Postgres);
        assert_eq!(settings.audit.node_id, Some(17));
        assert_eq!(settings.storage.contact_points, vec!["db-1", "db-2", "db-3"]);
        assert_eq!(settings.storage.pool_max_size, 4);
    }

    #[test]
    fn test_application_name_is_required() {
        assert!(matches!(load(&[]), Err(SettingsError::MissingApplicationName)));
        assert!(matches!(
            load(&[("APPLICATION_NAME", "   ")]),
            Err(SettingsError::MissingApplicationName)
        ));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("APPLICATION_NAME", "gw"), ("SERVER_PORT", "eighty")]),
            Err(SettingsError::ParseError("SERVER_PORT"))
        ));
        assert!(matches!(
            load(&[("APPLICATION_NAME", "gw"), ("AUDIT_NODE_ID", "1024")]),
            Err(SettingsError::NodeIdOutOfRange(1024))
        ));
        assert!(matches!(
            load(&[("APPLICATION_NAME", "gw"), ("AUDIT_STORE", "cassandra")]),
            Err(SettingsError::UnknownStore(_))
        ));
        assert!(matches!(
            load(&[("APPLICATION_NAME", "gw"), ("STORAGE_TABLE", "errors; drop")]),
            Err(SettingsError::InvalidIdentifier { key: "STORAGE_TABLE", .. })
        ));
        assert!(matches!(
            load(&[("APPLICATION_NAME", "gw"), ("STORAGE_CONTACT_POINTS", " , ")]),
            Err(SettingsError::NoContactPoints)
        ));
    }
}
