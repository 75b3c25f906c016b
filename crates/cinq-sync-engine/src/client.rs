//! HTTP delivery client.

use crate::{SyncError, SyncResult};
use cinq_store::QueuedMessage;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default request timeout in seconds. A hung request stalls only its own
/// item within a pass; this bounds how long.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Wire payload for one outgoing message.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePayload {
    pub contact_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_ping: Option<bool>,
    /// Client-generated idempotency key; identical on every retry of the
    /// same queued message.
    pub client_ref: String,
}

impl From<&QueuedMessage> for MessagePayload {
    fn from(message: &QueuedMessage) -> Self {
        Self {
            contact_id: message.contact_id.clone(),
            content: message.content.clone(),
            is_ping: message.is_ping.then_some(true),
            client_ref: message.client_ref.clone(),
        }
    }
}

/// Response envelope from the messages endpoint.
#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Response envelope from the contacts endpoint.
#[derive(Debug, Deserialize)]
struct ContactsResponse {
    success: bool,
    #[serde(default)]
    contacts: Vec<RemoteContact>,
    #[serde(default)]
    error: Option<String>,
}

/// A contact as returned by the contacts endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteContact {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// HTTP client for the Cinq API.
pub struct DeliveryClient {
    http: Client,
    api_url: String,
    anon_key: String,
}

impl DeliveryClient {
    pub fn new(api_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self::with_timeout(api_url, anon_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        api_url: impl Into<String>,
        anon_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            http,
            api_url: api_url.into(),
            anon_key: anon_key.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }

    /// Deliver one message. Success requires both an HTTP-ok status and
    /// `success: true` in the response envelope.
    pub async fn send_message(&self, message: &MessagePayload, token: &str) -> SyncResult<()> {
        let url = self.endpoint("/messages");
        debug!(url = %url, contact_id = %message.contact_id, "Sending message");

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("apikey", &self.anon_key)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Delivery(format!("HTTP {status}: {body}")));
        }

        let result: SendMessageResponse = response.json().await?;
        if result.success {
            Ok(())
        } else {
            Err(SyncError::Delivery(
                result.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }

    /// Replay a queued HTTP call. Success is judged purely by HTTP-ok
    /// status; the body, if any, goes out as JSON.
    pub async fn replay_action(
        &self,
        endpoint: &str,
        method: &str,
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> SyncResult<()> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| SyncError::Delivery(format!("invalid HTTP method: {method}")))?;
        let url = self.endpoint(endpoint);
        debug!(url = %url, method = %method, "Replaying action");

        let mut request = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bearer {token}"))
            .header("apikey", &self.anon_key);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SyncError::Delivery(format!("HTTP {status}")))
        }
    }

    /// Fetch the full contact list for a cache refresh.
    pub async fn fetch_contacts(&self, token: &str) -> SyncResult<Vec<RemoteContact>> {
        let url = self.endpoint("/contacts");
        debug!(url = %url, "Fetching contacts");

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("apikey", &self.anon_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Delivery(format!("HTTP {status}: {body}")));
        }

        let result: ContactsResponse = response.json().await?;
        if result.success {
            Ok(result.contacts)
        } else {
            Err(SyncError::Delivery(
                result.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(contact_id: &str, content: &str) -> QueuedMessage {
        QueuedMessage {
            id: 1,
            client_ref: "ref-1".to_string(),
            contact_id: contact_id.to_string(),
            content: Some(content.to_string()),
            is_ping: false,
            status: cinq_store::DeliveryStatus::Pending,
            retries: 0,
            last_error: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn text_payload_omits_ping_flag() {
        let payload = MessagePayload::from(&text_message("u1", "salut"));
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["contact_id"], "u1");
        assert_eq!(json["content"], "salut");
        assert_eq!(json["client_ref"], "ref-1");
        assert!(json.get("is_ping").is_none());
    }

    #[test]
    fn ping_payload_omits_content() {
        let mut message = text_message("u1", "ignored");
        message.content = None;
        message.is_ping = true;

        let payload = MessagePayload::from(&message);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["is_ping"], true);
        assert!(json.get("content").is_none());
    }

    #[test]
    fn envelope_parses_with_and_without_error() {
        let ok: SendMessageResponse =
            serde_json::from_str(r#"{"success":true,"message":{"id":"server-1"}}"#).unwrap();
        assert!(ok.success);
        assert!(ok.error.is_none());

        let rejected: SendMessageResponse =
            serde_json::from_str(r#"{"success":false,"error":"unknown contact"}"#).unwrap();
        assert!(!rejected.success);
        assert_eq!(rejected.error.as_deref(), Some("unknown contact"));
    }

    #[test]
    fn contacts_envelope_defaults_to_empty_list() {
        let parsed: ContactsResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(parsed.success);
        assert!(parsed.contacts.is_empty());
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = DeliveryClient::new("https://api.cinq.app/", "anon");
        assert_eq!(client.endpoint("/messages"), "https://api.cinq.app/messages");

        let client = DeliveryClient::new("https://api.cinq.app", "anon");
        assert_eq!(client.endpoint("/messages"), "https://api.cinq.app/messages");
    }

    #[tokio::test]
    async fn invalid_method_is_a_delivery_error() {
        let client = DeliveryClient::new("http://127.0.0.1:1", "anon");
        let err = client
            .replay_action("/x", "NOT A METHOD", None, "token")
            .await
            .expect_err("bad method");
        assert!(matches!(err, SyncError::Delivery(_)));
    }
}
