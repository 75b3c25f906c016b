//! Connectivity and lifecycle hooks for the Cinq offline queue.
//!
//! This crate provides:
//! - `ConnectivityWatcher`: an online/offline flag behind a watch channel,
//!   emitting an event on every transition
//! - `WorkerMessage`: typed messages from a cooperating background worker
//! - `SyncRegistrar`: background-sync tag registration, with a null
//!   implementation for platforms without the capability
//!
//! All three converge on the sync engine's entry points: the service's
//! trigger loop subscribes to the watcher and the worker channel and invokes
//! the same sync passes an explicit call would.

use cinq_store::{EventSink, QueueEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Background-sync tag for the message queue.
pub const SYNC_MESSAGES_TAG: &str = "sync-messages";

/// Background-sync tag for the action queue.
pub const SYNC_ACTIONS_TAG: &str = "sync-actions";

/// A typed message from a background worker.
///
/// The wire tags (`SYNC_MESSAGES`, ...) are what the worker process sends;
/// `from_tag` returns None for anything unrecognized rather than guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    SyncMessages,
    SyncActions,
    SyncStatus,
}

impl WorkerMessage {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::SyncMessages => "SYNC_MESSAGES",
            Self::SyncActions => "SYNC_ACTIONS",
            Self::SyncStatus => "SYNC_STATUS",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "SYNC_MESSAGES" => Some(Self::SyncMessages),
            "SYNC_ACTIONS" => Some(Self::SyncActions),
            "SYNC_STATUS" => Some(Self::SyncStatus),
            _ => None,
        }
    }
}

/// Registers named sync tags with a platform background-sync manager.
///
/// Queueing registers the relevant tag on every admit so a deferred drain
/// can run once connectivity returns. When the platform has no such
/// capability, [`NullRegistrar`] degrades gracefully to
/// connectivity-event-triggered sync only.
pub trait SyncRegistrar: Send + Sync {
    /// Register a sync tag. Repeated registration of the same tag is fine.
    fn register(&self, tag: &str);

    /// Whether the platform capability is present.
    fn is_supported(&self) -> bool {
        true
    }
}

/// Registrar for platforms without background sync. Registration is a no-op.
#[derive(Debug, Default)]
pub struct NullRegistrar;

impl SyncRegistrar for NullRegistrar {
    fn register(&self, tag: &str) {
        debug!(tag, "Background sync unavailable, skipping registration");
    }

    fn is_supported(&self) -> bool {
        false
    }
}

/// A registrar that records registrations for testing.
#[derive(Debug, Default)]
pub struct RecordingRegistrar {
    tags: std::sync::Mutex<Vec<String>>,
}

impl RecordingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.lock().expect("lock poisoned").clone()
    }
}

impl SyncRegistrar for RecordingRegistrar {
    fn register(&self, tag: &str) {
        self.tags.lock().expect("lock poisoned").push(tag.to_string());
    }
}

/// Online/offline flag behind a watch channel.
///
/// Consumers either poll [`is_online`](Self::is_online) or subscribe and
/// react to transitions. Every transition (and only a transition - setting
/// the same value twice is silent) emits `ConnectivityChanged`.
pub struct ConnectivityWatcher {
    sender: watch::Sender<bool>,
    sink: Arc<dyn EventSink>,
}

impl ConnectivityWatcher {
    pub fn new(initially_online: bool, sink: Arc<dyn EventSink>) -> Self {
        let (sender, _) = watch::channel(initially_online);
        Self { sender, sink }
    }

    /// Record a connectivity change. No-op unless the flag actually flips.
    pub fn set_online(&self, online: bool) {
        let previous = self.sender.send_replace(online);
        if previous != online {
            info!(online, "Connectivity changed");
            self.sink.emit(QueueEvent::ConnectivityChanged { online });
        }
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// A receiver that wakes on every transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl std::fmt::Debug for ConnectivityWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityWatcher")
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}
