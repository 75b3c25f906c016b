//! Queue lifecycle events.
//!
//! Events are emitted after the corresponding store mutation has committed.
//! They exist so UI surfaces can react to queue changes without the store
//! depending on any UI code.
//!
//! Delivery is fire-and-forget: no buffering, no replay. A sink attached
//! after an event fired never sees it, which is acceptable because every
//! piece of state is re-derivable from the store on demand.

use crate::models::DeliveryStatus;

/// An event emitted after a queue mutation commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// A message was admitted to the queue.
    MessageQueued { id: i64, contact_id: String },
    /// A queued message changed delivery status.
    MessageStatusChanged { id: i64, status: DeliveryStatus },
    /// A message was delivered, logged, and removed from the queue.
    MessageSent { id: i64, client_ref: String },
    /// A message exhausted its retry budget and was quarantined.
    MessageQuarantined { id: i64, error: String },

    /// An action was admitted to the queue.
    ActionQueued { id: i64, kind: String },
    /// An action was replayed successfully and removed.
    ActionCompleted { id: i64 },
    /// An action exhausted its retry budget and was quarantined.
    ActionQuarantined { id: i64, error: String },

    /// The contact cache was replaced with a fresh snapshot.
    ContactsCached { count: usize },

    /// A sync pass finished with aggregate counts.
    SyncComplete { sent: u32, failed: u32 },

    /// The online flag flipped.
    ConnectivityChanged { online: bool },
}

/// A sink that receives queue events.
///
/// Implementations decide what events mean (update a badge, log, notify).
pub trait EventSink: Send + Sync {
    /// Emit an event. Called after the corresponding mutation committed.
    fn emit(&self, event: QueueEvent);
}

/// A no-op sink that discards all events.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: QueueEvent) {
        // Intentionally empty - discard all events
    }
}

/// A sink that records all events for testing.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<QueueEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cloned snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<QueueEvent> {
        self.events.lock().expect("lock poisoned").clone()
    }

    pub fn clear(&self) {
        self.events.lock().expect("lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: QueueEvent) {
        self.events.lock().expect("lock poisoned").push(event);
    }
}
