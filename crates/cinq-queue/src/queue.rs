//! The queueing API: admit new work items, expose read accessors.

use crate::{QueueError, QueueResult};
use cinq_connectivity::{SyncRegistrar, SYNC_ACTIONS_TAG, SYNC_MESSAGES_TAG};
use cinq_store::{
    queries, CachedContact, DeliveryStatus, EventSink, MessageBody, NewCachedContact,
    NewPendingAction, NewQueuedMessage, PendingAction, QueueEvent, QueuedMessage, SentMessage,
    Store,
};
use std::sync::Arc;
use tracing::debug;

/// Extra fields merged into a status transition.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    /// Replaces the stored `last_error` when set.
    pub last_error: Option<String>,
    /// Counts one more failed attempt.
    pub bump_retries: bool,
}

/// Admission and read access for the offline queue.
///
/// All mutation funnels through the store's executor, so operations are
/// serialized; no content validation happens here (the network layer judges
/// payloads).
pub struct OutboundQueue {
    store: Store,
    sink: Arc<dyn EventSink>,
    registrar: Arc<dyn SyncRegistrar>,
}

impl OutboundQueue {
    pub fn new(
        store: Store,
        sink: Arc<dyn EventSink>,
        registrar: Arc<dyn SyncRegistrar>,
    ) -> Self {
        Self {
            store,
            sink,
            registrar,
        }
    }

    /// Handle to the underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    // ==========================================
    // Messages
    // ==========================================

    /// Admit an outgoing message. Persists it as `pending` with a fresh
    /// client reference, registers for background sync, emits
    /// `MessageQueued`, and returns the assigned local id.
    pub async fn queue_message(&self, contact_id: &str, body: MessageBody) -> QueueResult<i64> {
        let new_message = NewQueuedMessage {
            client_ref: uuid::Uuid::new_v4().to_string(),
            contact_id: contact_id.to_string(),
            content: body.content(),
            is_ping: body.is_ping(),
        };

        let message = self
            .store
            .call(move |conn| queries::insert_queued_message(conn, &new_message))
            .await?;

        self.registrar.register(SYNC_MESSAGES_TAG);
        debug!(id = message.id, contact_id = %message.contact_id, "Message queued");
        self.sink.emit(QueueEvent::MessageQueued {
            id: message.id,
            contact_id: message.contact_id,
        });
        Ok(message.id)
    }

    /// Messages awaiting delivery, in insertion order.
    pub async fn pending_messages(&self) -> QueueResult<Vec<QueuedMessage>> {
        Ok(self
            .store
            .call(|conn| queries::get_pending_messages(conn))
            .await?)
    }

    /// Count of messages awaiting delivery.
    pub async fn queued_count(&self) -> QueueResult<i64> {
        Ok(self
            .store
            .call(|conn| queries::count_pending_messages(conn))
            .await?)
    }

    /// Transition a message's status, merging `extra` and stamping
    /// `updated_at`. Fails with [`QueueError::NotFound`] if the id does not
    /// exist; emits `MessageStatusChanged` otherwise.
    pub async fn update_message_status(
        &self,
        id: i64,
        status: DeliveryStatus,
        extra: StatusUpdate,
    ) -> QueueResult<()> {
        let updated = self
            .store
            .call(move |conn| {
                queries::set_message_status(
                    conn,
                    id,
                    status,
                    extra.last_error.as_deref(),
                    extra.bump_retries,
                )
            })
            .await?;
        if !updated {
            return Err(QueueError::NotFound(id));
        }
        self.sink
            .emit(QueueEvent::MessageStatusChanged { id, status });
        Ok(())
    }

    /// Hard-delete a delivered message. Removing a missing id is a no-op.
    pub async fn remove_sent_message(&self, id: i64) -> QueueResult<()> {
        self.store
            .call(move |conn| queries::delete_queued_message(conn, id))
            .await?;
        Ok(())
    }

    /// Quarantined messages, in insertion order.
    pub async fn quarantined_messages(&self) -> QueueResult<Vec<QueuedMessage>> {
        Ok(self
            .store
            .call(|conn| queries::get_quarantined_messages(conn))
            .await?)
    }

    /// Return a quarantined message to service: `pending` with zeroed
    /// retries. Fails with [`QueueError::NotFound`] for an unknown id.
    pub async fn requeue_message(&self, id: i64) -> QueueResult<()> {
        let updated = self
            .store
            .call(move |conn| queries::requeue_message(conn, id))
            .await?;
        if !updated {
            return Err(QueueError::NotFound(id));
        }
        self.registrar.register(SYNC_MESSAGES_TAG);
        self.sink.emit(QueueEvent::MessageStatusChanged {
            id,
            status: DeliveryStatus::Pending,
        });
        Ok(())
    }

    /// Recent delivery history from the sent log, newest first.
    pub async fn sent_history(&self, limit: i64) -> QueueResult<Vec<SentMessage>> {
        Ok(self
            .store
            .call(move |conn| queries::list_sent_messages(conn, limit))
            .await?)
    }

    // ==========================================
    // Actions
    // ==========================================

    /// Admit a generic HTTP replay. Same pattern as messages, with the
    /// `sync-actions` tag and `ActionQueued`.
    pub async fn queue_action(&self, action: NewPendingAction) -> QueueResult<i64> {
        let inserted = self
            .store
            .call(move |conn| queries::insert_pending_action(conn, &action))
            .await?;

        self.registrar.register(SYNC_ACTIONS_TAG);
        debug!(id = inserted.id, kind = %inserted.kind, "Action queued");
        self.sink.emit(QueueEvent::ActionQueued {
            id: inserted.id,
            kind: inserted.kind,
        });
        Ok(inserted.id)
    }

    /// Actions awaiting replay, ascending priority then id.
    pub async fn pending_actions(&self) -> QueueResult<Vec<PendingAction>> {
        Ok(self
            .store
            .call(|conn| queries::get_pending_actions(conn))
            .await?)
    }

    /// Hard-delete an action. Removing a missing id is a no-op.
    pub async fn remove_action(&self, id: i64) -> QueueResult<()> {
        self.store
            .call(move |conn| queries::delete_pending_action(conn, id))
            .await?;
        Ok(())
    }

    // ==========================================
    // Contact cache
    // ==========================================

    /// Replace the whole contact cache with a fresh snapshot, atomically.
    pub async fn cache_contacts(&self, contacts: Vec<NewCachedContact>) -> QueueResult<usize> {
        let count = self
            .store
            .call(move |conn| queries::replace_contacts(conn, &contacts))
            .await?;
        self.sink.emit(QueueEvent::ContactsCached { count });
        Ok(count)
    }

    /// The current contact snapshot.
    pub async fn cached_contacts(&self) -> QueueResult<Vec<CachedContact>> {
        Ok(self.store.call(|conn| queries::list_contacts(conn)).await?)
    }

    /// Look up a cached contact by email.
    pub async fn contact_by_email(&self, email: &str) -> QueueResult<Option<CachedContact>> {
        let email = email.to_string();
        Ok(self
            .store
            .call(move |conn| queries::get_contact_by_email(conn, &email))
            .await?)
    }
}
