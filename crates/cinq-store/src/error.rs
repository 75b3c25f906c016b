//! Store error types.

use thiserror::Error;

/// Store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The store could not be opened or upgraded. Fatal to all queue
    /// operations; callers get the error back, nothing is retried.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Referenced local id does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
