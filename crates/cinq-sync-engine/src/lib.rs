//! Sync engine for the Cinq offline queue.
//!
//! Drains queued messages and actions against the network, one item at a
//! time, with per-item retry bookkeeping and status transitions. Invoked on
//! reconnect, on explicit trigger, or from a background-sync worker message;
//! all triggers converge on the same entry points, so delivery is
//! at-least-once (each payload carries a client-generated idempotency key
//! for server-side deduplication).
//!
//! # State machine per message
//!
//! ```text
//! pending ──▶ sending ──▶ sent (moved to log, row deleted)
//!                │
//!                ├──▶ pending (retries+1, last_error recorded)
//!                └──▶ failed  (quarantined once retries hit the cap)
//! ```

mod client;
mod engine;
mod error;
mod token;

pub use client::{DeliveryClient, MessagePayload, RemoteContact, DEFAULT_TIMEOUT_SECS};
pub use engine::{SyncEngine, SyncEngineConfig, SyncReport};
pub use error::{SyncError, SyncResult};
pub use token::{AccessTokenProvider, NoSession, StaticToken};
