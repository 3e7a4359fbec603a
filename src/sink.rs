//! Audit sinks and the background writer
//!
//! Records are handed to an [`AuditDispatcher`], which only enqueues them.
//! The [`AuditWriter`] task drains the queue and persists each record on
//! its own task, so neither a slow backend nor a dropped client connection
//! can hold up or cancel a response. Every failure ends in a local log line.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::models::ErrorRecord;

/// Audit persistence failures
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Audit storage unavailable: {0}")]
    Unavailable(String),

    #[error("Audit write timed out: {0}")]
    Timeout(String),

    #[error("Audit record could not be encoded: {0}")]
    Serialization(String),

    #[error("Audit queue is full")]
    QueueFull,

    #[error("Audit writer has shut down")]
    Closed,
}

/// Write-only storage for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one record as a single atomic insert
    async fn persist(&self, record: &ErrorRecord) -> Result<(), SinkError>;

    /// Short backend name for diagnostics
    fn name(&self) -> &'static str;
}

/// In-process sink keeping the most recent records
#[derive(Debug, Clone)]
pub struct MemoryAuditSink {
    records: Arc<RwLock<VecDeque<ErrorRecord>>>,
    capacity: usize,
}

impl MemoryAuditSink {
    pub fn new(capacity: usize) -> Self {
        info!(capacity, "Initializing in-memory audit sink");
        Self {
            records: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    /// Snapshot of stored records, oldest first
    pub async fn records(&self) -> Vec<ErrorRecord> {
        self.records.read().await.iter().cloned().collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn persist(&self, record: &ErrorRecord) -> Result<(), SinkError> {
        let mut records = self.records.write().await;

        // Remove oldest record if at capacity
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Outcome counters reported when the writer finishes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    pub persisted: u64,
    pub failed: u64,
}

impl WriterStats {
    fn observe(&mut self, outcome: Result<bool, JoinError>) {
        match outcome {
            Ok(true) => self.persisted += 1,
            Ok(false) => self.failed += 1,
            Err(join_error) => {
                error!(error = %join_error, "Audit write task aborted");
                self.failed += 1;
            }
        }
    }
}

/// Cloneable, non-blocking handle for submitting records
#[derive(Debug, Clone)]
pub struct AuditDispatcher {
    tx: mpsc::Sender<ErrorRecord>,
}

impl AuditDispatcher {
    /// Start the writer on the current arbiter.
    ///
    /// The writer stops once every dispatcher clone is dropped and all
    /// pending writes have finished.
    pub fn spawn(sink: Arc<dyn AuditSink>, capacity: usize) -> (Self, AuditWriter) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        info!(sink = sink.name(), capacity, "Starting audit writer");
        let handle = actix_rt::spawn(run_writer(sink, rx));
        (Self { tx }, AuditWriter { handle })
    }

    /// Enqueue a record without waiting.
    ///
    /// A rejected record is logged here; callers only need the result for
    /// their own bookkeeping.
    pub fn submit(&self, record: ErrorRecord) -> Result<(), SinkError> {
        let error_id = record.id();
        match self.tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                error!(error_id, "Audit queue full, dropping error record");
                Err(SinkError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(error_id, "Audit writer closed, dropping error record");
                Err(SinkError::Closed)
            }
        }
    }
}

/// Handle to the background writer task
#[derive(Debug)]
pub struct AuditWriter {
    handle: JoinHandle<WriterStats>,
}

impl AuditWriter {
    /// Wait for queued and in-flight writes, at most `grace`.
    ///
    /// Only completes once all dispatchers are dropped. Writes still
    /// running when the grace period ends are aborted and `None` is
    /// returned.
    pub async fn shutdown(mut self, grace: Duration) -> Option<WriterStats> {
        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(Ok(stats)) => {
                info!(
                    persisted = stats.persisted,
                    failed = stats.failed,
                    "Audit writer drained"
                );
                Some(stats)
            }
            Ok(Err(join_error)) => {
                error!(error = %join_error, "Audit writer terminated abnormally");
                None
            }
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Audit grace period elapsed, dropping pending writes"
                );
                self.handle.abort();
                None
            }
        }
    }
}

async fn run_writer(sink: Arc<dyn AuditSink>, mut rx: mpsc::Receiver<ErrorRecord>) -> WriterStats {
    let mut stats = WriterStats::default();
    let mut pending = JoinSet::new();

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(record) => {
                    let sink = Arc::clone(&sink);
                    pending.spawn(async move { persist_record(sink.as_ref(), record).await });
                }
                None => break,
            },
            Some(outcome) = pending.join_next(), if !pending.is_empty() => stats.observe(outcome),
        }
    }

    while let Some(outcome) = pending.join_next().await {
        stats.observe(outcome);
    }

    stats
}

async fn persist_record(sink: &dyn AuditSink, record: ErrorRecord) -> bool {
    match sink.persist(&record).await {
        Ok(()) => {
            debug!(error_id = record.id(), sink = sink.name(), "Error record persisted");
            true
        }
        Err(e) => {
            error!(
                error_id = record.id(),
                sink = sink.name(),
                status = record.status(),
                path = %record.path(),
                error = %e,
                "Failed to persist error record"
            );
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    /// Sink that rejects every write
    pub(crate) struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn persist(&self, _record: &ErrorRecord) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("connection refused".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    /// Sink that never finishes a write
    struct StalledSink;

    #[async_trait]
    impl AuditSink for StalledSink {
        async fn persist(&self, _record: &ErrorRecord) -> Result<(), SinkError> {
            std::future::pending().await
        }

        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    fn record(id: u64) -> ErrorRecord {
        ErrorRecord::new(
            id,
            "/api/areas/1".to_string(),
            "GET".to_string(),
            500,
            "Internal Server Error".to_string(),
            "boom".to_string(),
            "AppError::Internal".to_string(),
            Some("trace".to_string()),
            "gateway".to_string(),
            Utc::now(),
        )
    }

    #[actix_web::test]
    async fn test_memory_sink_evicts_oldest() {
        let sink = MemoryAuditSink::new(2);
        for id in 1..=3 {
            sink.persist(&record(id)).await.unwrap();
        }

        let ids: Vec<u64> = sink.records().await.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[actix_web::test]
    async fn test_writer_persists_and_drains() {
        let sink = Arc::new(MemoryAuditSink::new(16));
        let (dispatcher, writer) = AuditDispatcher::spawn(sink.clone(), 8);

        for id in 1..=5 {
            dispatcher.submit(record(id)).unwrap();
        }
        drop(dispatcher);

        let stats = writer.shutdown(Duration::from_secs(5)).await;
        assert_eq!(stats, Some(WriterStats { persisted: 5, failed: 0 }));
        assert_eq!(sink.records().await.len(), 5);
    }

    #[actix_web::test]
    async fn test_failures_are_counted_not_raised() {
        let (dispatcher, writer) = AuditDispatcher::spawn(Arc::new(FailingSink), 8);

        assert!(dispatcher.submit(record(1)).is_ok());
        drop(dispatcher);

        let stats = writer.shutdown(Duration::from_secs(5)).await;
        assert_eq!(stats, Some(WriterStats { persisted: 0, failed: 1 }));
    }

    #[actix_web::test]
    async fn test_full_queue_rejects_without_waiting() {
        let (dispatcher, writer) = AuditDispatcher::spawn(Arc::new(StalledSink), 1);

        // The writer has not run yet, so the single slot fills up.
        assert!(dispatcher.submit(record(1)).is_ok());
        assert!(matches!(dispatcher.submit(record(2)), Err(SinkError::QueueFull)));

        drop(dispatcher);
        assert_eq!(writer.shutdown(Duration::from_millis(50)).await, None);
    }
}
