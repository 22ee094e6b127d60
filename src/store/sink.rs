//! Detection Sink
//!
//! The persistence contract seen by the ingestion bridge: one fire-and-forget
//! call per qualifying detection.

use async_trait::async_trait;

use super::error::StoreResult;
use super::logs::LogStore;
use super::types::LogEntry;
use crate::events::DetectionRecord;

/// Accepts detection records for storage
#[async_trait]
pub trait DetectionSink: Send + Sync {
    /// Store one detection as an access log entry
    async fn record_detection(&self, record: DetectionRecord) -> StoreResult<LogEntry>;
}

#[async_trait]
impl DetectionSink for LogStore {
    async fn record_detection(&self, record: DetectionRecord) -> StoreResult<LogEntry> {
        self.create(record.into()).await
    }
}
