//! Log Store - SQLite table of access log entries
//!
//! A single connection guarded by a mutex; every query runs on the blocking
//! thread pool so callers on the async runtime never stall on disk I/O.

use chrono::{FixedOffset, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::error::{StoreError, StoreResult};
use super::filter::{LogFilter, TIMESTAMP_FORMAT};
use super::types::{LogEntry, NewLogEntry};

const DEFAULT_ROLE: &str = "unknown";

/// SQLite-backed access log
#[derive(Clone)]
pub struct LogStore {
    conn: Arc<Mutex<Connection>>,
    /// Site UTC offset, used for default timestamps and "today"
    offset: FixedOffset,
}

impl LogStore {
    /// Create or open the log database at `path`
    pub fn open(path: &Path, offset: FixedOffset) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Self::init(conn, offset)
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory(offset: FixedOffset) -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, offset)
    }

    fn init(conn: Connection, offset: FixedOffset) -> StoreResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                authorized INTEGER NOT NULL,
                confidence REAL NOT NULL,
                name TEXT NOT NULL,
                role TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            offset,
        })
    }

    /// Site UTC offset
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Current local date at the site
    pub fn today(&self) -> chrono::NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }

    /// Insert a log entry, filling in role and timestamp defaults
    pub async fn create(&self, entry: NewLogEntry) -> StoreResult<LogEntry> {
        if entry.name.trim().is_empty() {
            return Err(StoreError::Validation("Name cannot be empty".to_string()));
        }

        let role = entry
            .role
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE.to_string());
        let timestamp = entry.timestamp.filter(|t| !t.is_empty()).unwrap_or_else(|| {
            Utc::now()
                .with_timezone(&self.offset)
                .format(TIMESTAMP_FORMAT)
                .to_string()
        });

        let mut stored = LogEntry {
            id: 0,
            authorized: entry.authorized,
            confidence: entry.confidence,
            name: entry.name,
            role,
            timestamp,
        };

        let row = stored.clone();
        stored.id = self
            .with_conn(move |conn| {
                let now = Utc::now().to_rfc3339();
                conn.execute(
                    "INSERT INTO logs (authorized, confidence, name, role, timestamp, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                    params![
                        row.authorized,
                        row.confidence,
                        row.name,
                        row.role,
                        row.timestamp,
                        now,
                        now
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        Ok(stored)
    }

    /// All entries in insertion order
    pub async fn list(&self) -> StoreResult<Vec<LogEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, authorized, confidence, name, role, timestamp FROM logs ORDER BY id",
            )?;
            let entries = stmt
                .query_map([], row_to_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }

    /// Entries whose timestamp falls in the filter window
    pub async fn filter(&self, filter: &LogFilter) -> StoreResult<Vec<LogEntry>> {
        let filter = filter.clone();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, authorized, confidence, name, role, timestamp FROM logs
                 WHERE timestamp >= ?1 AND timestamp <= ?2 AND (?3 IS NULL OR name = ?3)
                 ORDER BY timestamp, id",
            )?;
            let entries = stmt
                .query_map(
                    params![filter.window.start, filter.window.end, filter.name],
                    row_to_entry,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }

    /// Look up one entry
    pub async fn get(&self, id: i64) -> StoreResult<Option<LogEntry>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, authorized, confidence, name, role, timestamp FROM logs WHERE id = ?",
                params![id],
                row_to_entry,
            )
            .optional()
        })
        .await
    }

    /// Delete one entry; returns false if it did not exist
    pub async fn delete(&self, id: i64) -> StoreResult<bool> {
        self.with_conn(move |conn| {
            let affected = conn.execute("DELETE FROM logs WHERE id = ?", params![id])?;
            Ok(affected > 0)
        })
        .await
    }

    /// Number of stored entries
    pub async fn count(&self) -> StoreResult<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::Lock(e.to_string()))?;
            f(&conn).map_err(StoreError::from)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get(0)?,
        authorized: row.get(1)?,
        confidence: row.get(2)?,
        name: row.get(3)?,
        role: row.get(4)?,
        timestamp: row.get(5)?,
    })
}
