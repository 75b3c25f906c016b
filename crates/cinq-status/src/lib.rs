//! Read-side status for the Cinq offline queue.
//!
//! Computes an aggregate snapshot on demand and renders the floating badge
//! label. Purely observational: nothing here mutates the store, and the
//! badge hides itself once the aggregate count reaches zero.

use chrono::{DateTime, Utc};
use cinq_store::{queries, Store, StoreResult, META_LAST_SYNC};
use serde::Serialize;
use tokio::sync::watch;

/// Aggregate queue state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub pending_messages: i64,
    pub pending_actions: i64,
    pub quarantined_messages: i64,
    pub last_sync: Option<DateTime<Utc>>,
    pub is_online: bool,
}

impl StatusSnapshot {
    /// Items awaiting delivery, across both queues.
    pub fn queued_total(&self) -> i64 {
        self.pending_messages + self.pending_actions
    }
}

/// The badge text for a snapshot, or `None` when nothing is queued and the
/// badge should be hidden.
pub fn badge_label(snapshot: &StatusSnapshot) -> Option<String> {
    match snapshot.queued_total() {
        0 => None,
        n => Some(format!("{n} en attente")),
    }
}

/// Computes status snapshots from the store and the connectivity watch.
#[derive(Clone)]
pub struct StatusReporter {
    store: Store,
    online: watch::Receiver<bool>,
}

impl StatusReporter {
    pub fn new(store: Store, online: watch::Receiver<bool>) -> Self {
        Self { store, online }
    }

    /// Current aggregate state, computed fresh from the store.
    pub async fn snapshot(&self) -> StoreResult<StatusSnapshot> {
        let (pending_messages, pending_actions, quarantined_messages, last_sync) = self
            .store
            .call(|conn| {
                let pending_messages = queries::count_pending_messages(conn)?;
                let pending_actions = queries::count_pending_actions(conn)?;
                let quarantined_messages = queries::count_quarantined_messages(conn)?;
                let last_sync = queries::get_meta(conn, META_LAST_SYNC)?.and_then(|entry| {
                    DateTime::parse_from_rfc3339(&entry.value)
                        .map(|dt| dt.with_timezone(&Utc))
                        .ok()
                });
                Ok((pending_messages, pending_actions, quarantined_messages, last_sync))
            })
            .await?;

        Ok(StatusSnapshot {
            pending_messages,
            pending_actions,
            quarantined_messages,
            last_sync,
            is_online: *self.online.borrow(),
        })
    }
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter").finish_non_exhaustive()
    }
}
