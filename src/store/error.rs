//! Log store error types

use thiserror::Error;

/// Errors that can occur in the log store
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O operation failed (creating the database directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input (bad date, empty name, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Connection mutex was poisoned by a panicking writer
    #[error("Lock error: {0}")]
    Lock(String),

    /// Blocking database task failed to complete
    #[error("Task error: {0}")]
    Join(String),
}

/// Result type for log store operations
pub type StoreResult<T> = Result<T, StoreError>;
