//! Access Log Storage
//!
//! SQLite-backed persistence of door access log entries.
//!
//! - [`LogStore`]: create / list / filter / delete log entries
//! - [`LogPeriod`] and [`LogFilter`]: day-window filtering in the site's
//!   local time
//! - [`DetectionSink`]: the one-way contract the ingestion bridge uses to
//!   record detections

mod error;
mod filter;
mod logs;
mod sink;
mod types;

pub use error::{StoreError, StoreResult};
pub use filter::{LogFilter, LogPeriod, TimeWindow, TIMESTAMP_FORMAT};
pub use logs::LogStore;
pub use sink::DetectionSink;
pub use types::{LogEntry, NewLogEntry};
