//! Sync engine error types.

use thiserror::Error;

/// Sync engine error type.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] cinq_store::StoreError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Delivery rejected by the endpoint
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using SyncError.
pub type SyncResult<T> = Result<T, SyncError>;
