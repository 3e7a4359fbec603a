//! PostgreSQL audit sink
//!
//! Appends one row per error record to `<keyspace>.<table>` through a
//! `deadpool-postgres` pool. Records are never updated or deleted here;
//! retention is managed outside the gateway.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::info;

use crate::config::StorageSettings;
use crate::models::ErrorRecord;
use crate::sink::{AuditSink, SinkError};

/// Pooled append-only writer for the audit table
pub struct PostgresAuditSink {
    pool: Pool,
    table: String,
    insert_sql: String,
}

impl PostgresAuditSink {
    /// Build the pool and verify one connection can be opened
    pub async fn connect(settings: &StorageSettings) -> Result<Self, SinkError> {
        let pool = build_pool(settings)?;

        let _client = pool.get().await.map_err(pool_error)?;

        let table = format!("{}.{}", settings.keyspace, settings.table);
        info!(
            contact_points = ?settings.contact_points,
            table = %table,
            "PostgreSQL audit sink connected"
        );

        Ok(Self {
            pool,
            insert_sql: insert_statement(&table),
            table,
        })
    }

    /// Create the schema and audit table when they do not exist yet
    pub async fn ensure_schema(&self, keyspace: &str) -> Result<(), SinkError> {
        let client = self.pool.get().await.map_err(pool_error)?;

        client
            .batch_execute(&schema_statements(keyspace, &self.table))
            .await
            .map_err(|e| SinkError::Unavailable(format!("Failed to create audit table: {}", e)))?;

        info!(table = %self.table, "Audit table ready");
        Ok(())
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn persist(&self, record: &ErrorRecord) -> Result<(), SinkError> {
        let id = i64::try_from(record.id())
            .map_err(|_| SinkError::Serialization(format!("id {} exceeds BIGINT", record.id())))?;
        let status = i32::from(record.status());

        let client = self.pool.get().await.map_err(pool_error)?;

        client
            .execute(
                self.insert_sql.as_str(),
                &[
                    &id,
                    &record.path(),
                    &record.method_name(),
                    &status,
                    &record.error_phrase(),
                    &record.message(),
                    &record.exception_type(),
                    &record.trace(),
                    &record.application_name(),
                    &record.timestamp(),
                ],
            )
            .await
            .map_err(statement_error)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

fn build_pool(settings: &StorageSettings) -> Result<Pool, SinkError> {
    let mut config = tokio_postgres::Config::new();
    for host in &settings.contact_points {
        config.host(host);
    }
    config
        .port(settings.port)
        .dbname(&settings.database)
        .application_name("gateway-audit")
        .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
        .options(&format!("-c statement_timeout={}", settings.read_timeout_ms));
    if let Some(username) = &settings.username {
        config.user(username);
    }
    if let Some(password) = &settings.password {
        config.password(password);
    }

    let manager_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let manager = Manager::from_config(config, NoTls, manager_config);

    let pool_timeout = Some(Duration::from_millis(settings.pool_timeout_ms));
    Pool::builder(manager)
        .max_size(settings.pool_max_size)
        .runtime(Runtime::Tokio1)
        .wait_timeout(pool_timeout)
        .create_timeout(Some(Duration::from_millis(settings.connect_timeout_ms)))
        .recycle_timeout(pool_timeout)
        .build()
        .map_err(|e| SinkError::Unavailable(format!("Failed to create pool: {}", e)))
}

fn insert_statement(table: &str) -> String {
    format!(
        "INSERT INTO {table} \
         (id, path, method_name, status, error, message, exception, trace, application_name, \"timestamp\") \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
    )
}

fn schema_statements(keyspace: &str, table: &str) -> String {
    format!(
        "CREATE SCHEMA IF NOT EXISTS {keyspace};
         CREATE TABLE IF NOT EXISTS {table} (
             id BIGINT PRIMARY KEY,
             path VARCHAR NOT NULL,
             method_name VARCHAR NOT NULL,
             status INT NOT NULL,
             error TEXT NOT NULL,
             message VARCHAR NOT NULL,
             exception VARCHAR NOT NULL,
             trace TEXT,
             application_name TEXT NOT NULL,
             \"timestamp\" TIMESTAMPTZ NOT NULL
         );"
    )
}

fn pool_error(e: PoolError) -> SinkError {
    match e {
        PoolError::Timeout(kind) => SinkError::Timeout(format!("connection pool {:?}", kind)),
        other => SinkError::Unavailable(other.to_string()),
    }
}

/// Server-side statement timeouts surface as SQLSTATE 57014
fn statement_error(e: tokio_postgres::Error) -> SinkError {
    if e.code() == Some(&tokio_postgres::error::SqlState::QUERY_CANCELED) {
        SinkError::Timeout(e.to_string())
    } else {
        SinkError::Unavailable(e.to_string())
    }
}
