//! Store model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata key holding the timestamp of the last completed sync pass.
pub const META_LAST_SYNC: &str = "last_sync";

/// Delivery status of a queued item.
///
/// `sent` never survives a sync pass in the queue table: a delivered row is
/// moved to the sent log and deleted in the same transaction. `failed` is the
/// quarantine state for items that exhausted their retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl Default for DeliveryStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sending" => Self::Sending,
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Payload of an outgoing message: either text content or a contentless ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Ping,
}

impl MessageBody {
    /// Text content, if any.
    pub fn content(&self) -> Option<String> {
        match self {
            Self::Text(content) => Some(content.clone()),
            Self::Ping => None,
        }
    }

    pub fn is_ping(&self) -> bool {
        matches!(self, Self::Ping)
    }
}

/// A locally queued outgoing message awaiting delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Local auto-increment id, unique, never reused.
    pub id: i64,
    /// Client-generated UUID sent with every delivery attempt so the server
    /// can deduplicate a retried send whose response was lost.
    pub client_ref: String,
    /// Opaque recipient reference; not validated locally.
    pub contact_id: String,
    pub content: Option<String>,
    pub is_ping: bool,
    pub status: DeliveryStatus,
    pub retries: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New queued message for insertion.
#[derive(Debug, Clone)]
pub struct NewQueuedMessage {
    pub client_ref: String,
    pub contact_id: String,
    pub content: Option<String>,
    pub is_ping: bool,
}

/// A delivered message retained in the sent log for history queries.
/// `id` is the local queue id the message carried before delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: i64,
    pub client_ref: String,
    pub contact_id: String,
    pub content: Option<String>,
    pub is_ping: bool,
    pub created_at: DateTime<Utc>,
    pub sent_at: DateTime<Utc>,
}

/// A generic HTTP call queued for replay once connectivity returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: i64,
    /// Free-form tag identifying the action's semantic kind.
    pub kind: String,
    pub endpoint: String,
    pub method: String,
    pub body: Option<serde_json::Value>,
    /// Lower value = higher urgency. Actions drain in ascending priority
    /// order, not FIFO.
    pub priority: i32,
    pub status: DeliveryStatus,
    pub retries: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Default priority for new actions.
pub const DEFAULT_ACTION_PRIORITY: i32 = 5;

/// New pending action for insertion.
#[derive(Debug, Clone)]
pub struct NewPendingAction {
    pub kind: String,
    pub endpoint: String,
    pub method: String,
    pub body: Option<serde_json::Value>,
    pub priority: i32,
}

impl NewPendingAction {
    /// Build an action with the default priority.
    pub fn new(
        kind: impl Into<String>,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        body: Option<serde_json::Value>,
    ) -> Self {
        Self {
            kind: kind.into(),
            endpoint: endpoint.into(),
            method: method.into(),
            body,
            priority: DEFAULT_ACTION_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// A contact snapshot from the last successful contacts fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedContact {
    /// Remote contact identifier.
    pub id: String,
    /// Unique secondary key.
    pub email: String,
    pub display_name: Option<String>,
    pub cached_at: DateTime<Utc>,
}

/// New cached contact for insertion.
#[derive(Debug, Clone)]
pub struct NewCachedContact {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Sync bookkeeping entry - key-value, no relational constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMetaEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_status_from_str() {
        assert_eq!(DeliveryStatus::from_str("pending"), DeliveryStatus::Pending);
        assert_eq!(DeliveryStatus::from_str("PENDING"), DeliveryStatus::Pending);
        assert_eq!(DeliveryStatus::from_str("sending"), DeliveryStatus::Sending);
        assert_eq!(DeliveryStatus::from_str("sent"), DeliveryStatus::Sent);
        assert_eq!(DeliveryStatus::from_str("failed"), DeliveryStatus::Failed);
        // Unknown defaults to Pending
        assert_eq!(DeliveryStatus::from_str("garbage"), DeliveryStatus::Pending);
        assert_eq!(DeliveryStatus::from_str(""), DeliveryStatus::Pending);
    }

    #[test]
    fn delivery_status_as_str_round_trips() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Sending,
            DeliveryStatus::Sent,
            DeliveryStatus::Failed,
        ] {
            assert_eq!(DeliveryStatus::from_str(status.as_str()), status);
        }
    }

    #[test]
    fn delivery_status_default_is_pending() {
        assert_eq!(DeliveryStatus::default(), DeliveryStatus::Pending);
    }

    #[test]
    fn message_body_text() {
        let body = MessageBody::Text("salut".to_string());
        assert_eq!(body.content().as_deref(), Some("salut"));
        assert!(!body.is_ping());
    }

    #[test]
    fn message_body_ping_has_no_content() {
        let body = MessageBody::Ping;
        assert!(body.content().is_none());
        assert!(body.is_ping());
    }

    #[test]
    fn new_action_defaults_priority() {
        let action = NewPendingAction::new("profile-update", "/profile", "PUT", None);
        assert_eq!(action.priority, DEFAULT_ACTION_PRIORITY);

        let urgent = NewPendingAction::new("read-receipt", "/receipts", "POST", None)
            .with_priority(1);
        assert_eq!(urgent.priority, 1);
    }
}
