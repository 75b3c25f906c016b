//! Durable local store for the Cinq offline queue.
//!
//! This crate provides:
//! - An async SQLite store with a dedicated executor thread
//! - Versioned additive migrations for the four queue collections
//!   (queued messages, pending actions, contact cache, sync metadata)
//!   plus the sent log
//! - Model types and query helpers for CRUD access
//! - The queue event bus (`QueueEvent` / `EventSink`)
//! - Single-flight shared initialization (`SharedStore`)
//!
//! # Architecture
//!
//! All store access goes through [`Store::call`], which runs the given
//! closure on one dedicated SQLite thread in FIFO order:
//!
//! ```ignore
//! let store = Store::open(path).await?;
//! let pending = store.call(|conn| queries::get_pending_messages(conn)).await?;
//! ```
//!
//! The store exclusively owns its collections; mutation happens only through
//! the queueing API and the sync engine's update paths, both of which funnel
//! through this executor.

mod error;
mod events;
mod migrations;
mod models;
pub mod queries;
mod shared;
mod store;

pub use error::{StoreError, StoreResult};
pub use events::{EventSink, NullSink, QueueEvent, RecordingSink};
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::*;
pub use shared::SharedStore;
pub use store::Store;
