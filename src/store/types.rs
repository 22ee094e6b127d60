//! Access log record types

use serde::{Deserialize, Serialize};

use crate::events::DetectionRecord;

/// A stored access log entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub authorized: bool,
    pub confidence: f64,
    pub name: String,
    pub role: String,
    pub timestamp: String,
}

/// A log entry to be created, as submitted by clients or the detector
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewLogEntry {
    #[serde(default)]
    pub authorized: bool,
    #[serde(default)]
    pub confidence: f64,
    pub name: String,
    /// Defaults to "unknown"
    #[serde(default)]
    pub role: Option<String>,
    /// Defaults to the time of insertion
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl NewLogEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            authorized: false,
            confidence: 0.0,
            name: name.into(),
            role: None,
            timestamp: None,
        }
    }

    pub fn authorized(mut self, authorized: bool) -> Self {
        self.authorized = authorized;
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

impl From<DetectionRecord> for NewLogEntry {
    fn from(record: DetectionRecord) -> Self {
        Self {
            authorized: record.authorized,
            confidence: record.confidence,
            name: record.name,
            role: Some(record.role),
            timestamp: Some(record.timestamp),
        }
    }
}
