//! Queue error types.

use thiserror::Error;

/// Queue error type.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] cinq_store::StoreError),

    /// Referenced local id does not exist
    #[error("No queued item with id {0}")]
    NotFound(i64),
}

/// Result type alias using QueueError.
pub type QueueResult<T> = Result<T, QueueError>;
