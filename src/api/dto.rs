//! Data Transfer Objects
//!
//! Request and response bodies for the REST endpoints.

use serde::{Deserialize, Serialize};

use crate::store::LogEntry;

/// `GET /api/logs` response
#[derive(Debug, Serialize)]
pub struct LogListResponse {
    pub data: Vec<LogEntry>,
}

/// `GET /api/logs/filter` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct LogFilterQuery {
    /// `today`, `date`, or `range`
    pub period: Option<String>,
    /// `YYYY-MM-DD`, used with `period=date`
    pub date: Option<String>,
    /// `YYYY-MM-DD`, used with `period=range`
    pub start: Option<String>,
    /// `YYYY-MM-DD`, used with `period=range`
    pub end: Option<String>,
    /// Exact name match
    pub name: Option<String>,
}

/// `GET /api/logs/filter` response
#[derive(Debug, Serialize)]
pub struct FilteredLogsResponse {
    pub data: Vec<LogEntry>,
    pub count: usize,
    /// Entries named "Unknown" in the window
    pub unknown_visitors: usize,
}

/// Single-entry response
#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub data: LogEntry,
}

/// Plain message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub subscribers: usize,
    pub uptime_seconds: u64,
    pub version: String,
}
