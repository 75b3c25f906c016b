//! Service error types.

use thiserror::Error;

/// Service error type.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] cinq_store::StoreError),

    /// Queue error
    #[error("Queue error: {0}")]
    Queue(#[from] cinq_queue::QueueError),

    /// Sync engine error
    #[error("Sync error: {0}")]
    Sync(#[from] cinq_sync_engine::SyncError),

    /// No home directory to anchor ~/.cinq
    #[error("Home directory not found")]
    HomeDirUnavailable,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using ServiceError.
pub type ServiceResult<T> = Result<T, ServiceError>;
