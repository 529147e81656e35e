//! Error types for persistent memory

use thiserror::Error;

/// Convenience result type using [`MemoryError`]
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Errors from the journal, learning cache, or briefing
#[derive(Error, Debug)]
pub enum MemoryError {
    /// SQLite operation failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Durable state was inconsistent or unreadable
    #[error("corrupt memory state: {0}")]
    Corrupt(String),

    /// Could not acquire the journal lock within the deadline
    #[error("timed out waiting for journal lock at {path}")]
    LockTimeout {
        /// Lock file path
        path: String,
    },
}
