//! Queueing API for the Cinq offline queue.
//!
//! Validates and admits new work items into the store and exposes read
//! accessors. Every admit assigns a local auto-increment id, registers the
//! matching background-sync tag, and emits a lifecycle event.

mod error;
mod queue;

pub use error::{QueueError, QueueResult};
pub use queue::{OutboundQueue, StatusUpdate};
