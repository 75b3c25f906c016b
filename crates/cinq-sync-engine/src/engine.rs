//! Drain passes over the pending queues.

use crate::client::{DeliveryClient, MessagePayload};
use crate::{AccessTokenProvider, SyncResult};
use chrono::Utc;
use cinq_store::{
    queries, DeliveryStatus, EventSink, NewCachedContact, PendingAction, QueueEvent,
    QueuedMessage, Store, META_LAST_SYNC,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Error recorded when the session layer has no token for an attempt.
const NO_TOKEN_ERROR: &str = "no access token";

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Failed attempts before an item is quarantined as `failed` instead of
    /// silently retrying forever.
    pub max_retries: i32,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self { max_retries: 25 }
    }
}

/// Aggregate counts for one completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub sent: u32,
    pub failed: u32,
}

/// Drains pending messages and actions against the network.
///
/// One pass processes its snapshot strictly sequentially - never in
/// parallel - to preserve per-conversation ordering of sent messages. Items
/// enqueued mid-pass wait for the next trigger. Per-item errors become retry
/// state and never cross the pass boundary, so one bad item cannot block the
/// queue from draining everything else.
pub struct SyncEngine {
    store: Store,
    client: DeliveryClient,
    tokens: Arc<dyn AccessTokenProvider>,
    sink: Arc<dyn EventSink>,
    config: SyncEngineConfig,
    /// Serializes passes within this process. Cross-process coordination is
    /// explicitly out of scope.
    pass_guard: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        store: Store,
        client: DeliveryClient,
        tokens: Arc<dyn AccessTokenProvider>,
        sink: Arc<dyn EventSink>,
        config: SyncEngineConfig,
    ) -> Self {
        Self {
            store,
            client,
            tokens,
            sink,
            config,
            pass_guard: Mutex::new(()),
        }
    }

    /// One drain pass over pending messages.
    pub async fn sync_messages(&self) -> SyncResult<SyncReport> {
        let _pass = self.pass_guard.lock().await;

        let snapshot = self.store.call(queries::get_pending_messages).await?;
        debug!(count = snapshot.len(), "Starting message sync pass");

        let mut report = SyncReport::default();
        for message in snapshot {
            let id = message.id;
            self.transition(id, DeliveryStatus::Sending, None).await?;

            let Some(token) = self.tokens.access_token() else {
                self.record_message_failure(&message, NO_TOKEN_ERROR).await?;
                report.failed += 1;
                continue;
            };

            let payload = MessagePayload::from(&message);
            match self.client.send_message(&payload, &token).await {
                Ok(()) => {
                    let delivered = message.clone();
                    self.store
                        .call(move |conn| queries::complete_message(conn, &delivered, Utc::now()))
                        .await?;
                    report.sent += 1;
                    debug!(id, "Message delivered");
                    self.sink.emit(QueueEvent::MessageSent {
                        id,
                        client_ref: message.client_ref,
                    });
                }
                Err(err) => {
                    self.record_message_failure(&message, &err.to_string())
                        .await?;
                    report.failed += 1;
                }
            }
        }

        self.finish_pass(&report, "Message").await?;
        Ok(report)
    }

    /// One drain pass over pending actions, in ascending priority order.
    pub async fn sync_actions(&self) -> SyncResult<SyncReport> {
        let _pass = self.pass_guard.lock().await;

        let snapshot = self.store.call(queries::get_pending_actions).await?;
        debug!(count = snapshot.len(), "Starting action sync pass");

        let mut report = SyncReport::default();
        for action in snapshot {
            let id = action.id;

            let Some(token) = self.tokens.access_token() else {
                self.record_action_failure(&action, NO_TOKEN_ERROR).await?;
                report.failed += 1;
                continue;
            };

            let outcome = self
                .client
                .replay_action(&action.endpoint, &action.method, action.body.as_ref(), &token)
                .await;
            match outcome {
                Ok(()) => {
                    self.store
                        .call(move |conn| {
                            queries::delete_pending_action(conn, id)?;
                            Ok(())
                        })
                        .await?;
                    report.sent += 1;
                    debug!(id, kind = %action.kind, "Action replayed");
                    self.sink.emit(QueueEvent::ActionCompleted { id });
                }
                Err(err) => {
                    self.record_action_failure(&action, &err.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        self.finish_pass(&report, "Action").await?;
        Ok(report)
    }

    /// Messages first, then actions.
    pub async fn sync_all(&self) -> SyncResult<(SyncReport, SyncReport)> {
        let messages = self.sync_messages().await?;
        let actions = self.sync_actions().await?;
        Ok((messages, actions))
    }

    /// Replace the contact cache from the contacts endpoint.
    ///
    /// Skips quietly when no session is active - the stale snapshot stays.
    pub async fn refresh_contacts(&self) -> SyncResult<usize> {
        let Some(token) = self.tokens.access_token() else {
            debug!("Skipping contacts refresh (no access token)");
            return Ok(0);
        };

        let remote = self.client.fetch_contacts(&token).await?;
        let contacts: Vec<NewCachedContact> = remote
            .into_iter()
            .map(|contact| NewCachedContact {
                id: contact.id,
                email: contact.email,
                display_name: contact.display_name,
            })
            .collect();

        let count = self
            .store
            .call(move |conn| queries::replace_contacts(conn, &contacts))
            .await?;
        info!(count, "Contact cache refreshed");
        self.sink.emit(QueueEvent::ContactsCached { count });
        Ok(count)
    }

    async fn transition(
        &self,
        id: i64,
        status: DeliveryStatus,
        last_error: Option<String>,
    ) -> SyncResult<()> {
        let bump = last_error.is_some();
        self.store
            .call(move |conn| {
                queries::set_message_status(conn, id, status, last_error.as_deref(), bump)?;
                Ok(())
            })
            .await?;
        self.sink.emit(QueueEvent::MessageStatusChanged { id, status });
        Ok(())
    }

    /// Record one failed delivery attempt: revert to `pending` for the next
    /// trigger, or quarantine once the retry budget is spent.
    async fn record_message_failure(
        &self,
        message: &QueuedMessage,
        error: &str,
    ) -> SyncResult<()> {
        let attempts = message.retries + 1;
        if attempts >= self.config.max_retries {
            warn!(
                id = message.id,
                attempts,
                error,
                "Message quarantined after exhausting retries"
            );
            self.transition(message.id, DeliveryStatus::Failed, Some(error.to_string()))
                .await?;
            self.sink.emit(QueueEvent::MessageQuarantined {
                id: message.id,
                error: error.to_string(),
            });
        } else {
            warn!(id = message.id, attempts, error, "Message delivery failed, will retry");
            self.transition(message.id, DeliveryStatus::Pending, Some(error.to_string()))
                .await?;
        }
        Ok(())
    }

    async fn record_action_failure(&self, action: &PendingAction, error: &str) -> SyncResult<()> {
        let id = action.id;
        let attempts = action.retries + 1;
        if attempts >= self.config.max_retries {
            warn!(id, attempts, error, "Action quarantined after exhausting retries");
            let error_owned = error.to_string();
            self.store
                .call(move |conn| {
                    queries::set_action_status(
                        conn,
                        id,
                        DeliveryStatus::Failed,
                        Some(&error_owned),
                        true,
                    )?;
                    Ok(())
                })
                .await?;
            self.sink.emit(QueueEvent::ActionQuarantined {
                id,
                error: error.to_string(),
            });
        } else {
            warn!(id, attempts, error, "Action replay failed, will retry");
            let error_owned = error.to_string();
            self.store
                .call(move |conn| {
                    queries::set_action_status(
                        conn,
                        id,
                        DeliveryStatus::Pending,
                        Some(&error_owned),
                        true,
                    )?;
                    Ok(())
                })
                .await?;
        }
        Ok(())
    }

    async fn finish_pass(&self, report: &SyncReport, label: &str) -> SyncResult<()> {
        self.store
            .call(|conn| queries::set_meta(conn, META_LAST_SYNC, &Utc::now().to_rfc3339()))
            .await?;
        info!(sent = report.sent, failed = report.failed, "{label} sync pass complete");
        self.sink.emit(QueueEvent::SyncComplete {
            sent: report.sent,
            failed: report.failed,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{NoSession, StaticToken};
    use cinq_store::{MessageBody, NewPendingAction, NewQueuedMessage, RecordingSink};
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response per entry, then stop accepting.
    async fn stub_server(responses: Vec<(u16, String)>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (code, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {code} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len(),
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        addr
    }

    /// Read request headers plus the declared body before responding.
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = vec![0u8; 16384];
        let mut read = 0;
        loop {
            let Ok(n) = socket.read(&mut buf[read..]).await else {
                return;
            };
            if n == 0 {
                return;
            }
            read += n;
            if let Some(header_end) = buf[..read].windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if read >= header_end + 4 + content_length {
                    return;
                }
            }
            if read == buf.len() {
                return;
            }
        }
    }

    /// An address nothing listens on.
    async fn dead_endpoint() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    struct Harness {
        store: Store,
        sink: Arc<RecordingSink>,
    }

    impl Harness {
        async fn new() -> Self {
            Self {
                store: Store::open_in_memory().await.unwrap(),
                sink: Arc::new(RecordingSink::new()),
            }
        }

        fn engine_at(&self, addr: SocketAddr, config: SyncEngineConfig) -> SyncEngine {
            SyncEngine::new(
                self.store.clone(),
                DeliveryClient::new(format!("http://{addr}"), "anon"),
                Arc::new(StaticToken("jwt".to_string())),
                self.sink.clone(),
                config,
            )
        }

        async fn enqueue(&self, contact_id: &str, body: MessageBody) -> QueuedMessage {
            let new_message = NewQueuedMessage {
                client_ref: format!("ref-{contact_id}"),
                contact_id: contact_id.to_string(),
                content: body.content(),
                is_ping: body.is_ping(),
            };
            self.store
                .call(move |conn| queries::insert_queued_message(conn, &new_message))
                .await
                .unwrap()
        }

        async fn pending(&self) -> Vec<QueuedMessage> {
            self.store
                .call(queries::get_pending_messages)
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn successful_pass_delivers_exactly_once() {
        let harness = Harness::new().await;
        let queued = harness
            .enqueue("u1", MessageBody::Text("hi".to_string()))
            .await;

        let addr = stub_server(vec![(
            200,
            r#"{"success":true,"message":{"id":"server-1"}}"#.to_string(),
        )])
        .await;
        let engine = harness.engine_at(addr, SyncEngineConfig::default());

        let report = engine.sync_messages().await.unwrap();
        assert_eq!(report, SyncReport { sent: 1, failed: 0 });

        // Queue drained, one sent-log row carrying the local id
        assert!(harness.pending().await.is_empty());
        let sent = harness
            .store
            .call(|conn| queries::list_sent_messages(conn, 10))
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, queued.id);

        // Exactly one MessageSent, carrying the queued id
        let sent_events: Vec<_> = harness
            .sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, QueueEvent::MessageSent { .. }))
            .collect();
        assert_eq!(
            sent_events,
            vec![QueueEvent::MessageSent {
                id: queued.id,
                client_ref: queued.client_ref.clone(),
            }]
        );
        assert!(harness
            .sink
            .events()
            .contains(&QueueEvent::SyncComplete { sent: 1, failed: 0 }));

        // Last-sync bookkeeping was stamped
        let meta = harness
            .store
            .call(|conn| queries::get_meta(conn, META_LAST_SYNC))
            .await
            .unwrap();
        assert!(meta.is_some());
    }

    #[tokio::test]
    async fn failed_delivery_reverts_to_pending_with_error() {
        let harness = Harness::new().await;
        let queued = harness
            .enqueue("u1", MessageBody::Text("hi".to_string()))
            .await;

        let addr = dead_endpoint().await;
        let engine = harness.engine_at(addr, SyncEngineConfig::default());

        let report = engine.sync_messages().await.unwrap();
        assert_eq!(report, SyncReport { sent: 0, failed: 1 });

        // Not stuck in `sending`: back to pending with one recorded attempt
        let pending = harness.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, queued.id);
        assert_eq!(pending[0].status, DeliveryStatus::Pending);
        assert_eq!(pending[0].retries, 1);
        assert!(pending[0].last_error.as_deref().is_some_and(|e| !e.is_empty()));

        // The retry keeps the same idempotency key
        assert_eq!(pending[0].client_ref, queued.client_ref);

        // No MessageSent event fired
        assert!(!harness
            .sink
            .events()
            .iter()
            .any(|e| matches!(e, QueueEvent::MessageSent { .. })));
    }

    #[tokio::test]
    async fn server_rejection_counts_as_failure() {
        let harness = Harness::new().await;
        harness.enqueue("u1", MessageBody::Ping).await;

        let addr = stub_server(vec![(
            200,
            r#"{"success":false,"error":"unknown contact"}"#.to_string(),
        )])
        .await;
        let engine = harness.engine_at(addr, SyncEngineConfig::default());

        let report = engine.sync_messages().await.unwrap();
        assert_eq!(report, SyncReport { sent: 0, failed: 1 });

        let pending = harness.pending().await;
        assert!(pending[0]
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("unknown contact")));
    }

    #[tokio::test]
    async fn missing_token_fails_items_without_aborting_the_pass() {
        let harness = Harness::new().await;
        harness.enqueue("u1", MessageBody::Ping).await;
        harness.enqueue("u2", MessageBody::Ping).await;

        let engine = SyncEngine::new(
            harness.store.clone(),
            DeliveryClient::new("http://127.0.0.1:1", "anon"),
            Arc::new(NoSession),
            harness.sink.clone(),
            SyncEngineConfig::default(),
        );

        let report = engine.sync_messages().await.unwrap();
        assert_eq!(report, SyncReport { sent: 0, failed: 2 });

        // Both items were attempted; neither aborted the pass
        let pending = harness.pending().await;
        assert_eq!(pending.len(), 2);
        for message in &pending {
            assert_eq!(message.retries, 1);
            assert_eq!(message.last_error.as_deref(), Some("no access token"));
        }
    }

    #[tokio::test]
    async fn exhausted_retries_quarantine_the_message() {
        let harness = Harness::new().await;
        let queued = harness.enqueue("u1", MessageBody::Ping).await;

        let addr = dead_endpoint().await;
        let engine = harness.engine_at(addr, SyncEngineConfig { max_retries: 2 });

        // First pass: retries 1, still pending
        engine.sync_messages().await.unwrap();
        assert_eq!(harness.pending().await.len(), 1);

        // Second pass reaches the cap: quarantined
        engine.sync_messages().await.unwrap();
        assert!(harness.pending().await.is_empty());

        let quarantined = harness
            .store
            .call(queries::get_quarantined_messages)
            .await
            .unwrap();
        assert_eq!(quarantined.len(), 1);
        assert_eq!(quarantined[0].id, queued.id);
        assert_eq!(quarantined[0].retries, 2);

        assert!(harness
            .sink
            .events()
            .iter()
            .any(|e| matches!(e, QueueEvent::MessageQuarantined { id, .. } if *id == queued.id)));

        // Third pass sees an empty snapshot
        let report = engine.sync_messages().await.unwrap();
        assert_eq!(report, SyncReport { sent: 0, failed: 0 });
    }

    #[tokio::test]
    async fn actions_drain_in_priority_order_and_delete_on_ok() {
        let harness = Harness::new().await;
        let low = harness
            .store
            .call(|conn| {
                queries::insert_pending_action(
                    conn,
                    &NewPendingAction::new("profile", "/profile", "PUT", None).with_priority(7),
                )
            })
            .await
            .unwrap();
        let urgent = harness
            .store
            .call(|conn| {
                queries::insert_pending_action(
                    conn,
                    &NewPendingAction::new(
                        "receipt",
                        "/receipts",
                        "POST",
                        Some(serde_json::json!({"message_id": "m-9"})),
                    )
                    .with_priority(1),
                )
            })
            .await
            .unwrap();

        let addr = stub_server(vec![(200, "{}".to_string()), (200, "{}".to_string())]).await;
        let engine = harness.engine_at(addr, SyncEngineConfig::default());

        let report = engine.sync_actions().await.unwrap();
        assert_eq!(report, SyncReport { sent: 2, failed: 0 });

        let remaining = harness
            .store
            .call(queries::get_pending_actions)
            .await
            .unwrap();
        assert!(remaining.is_empty());

        // Completion events arrive in drain order: urgent first
        let completed: Vec<i64> = harness
            .sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                QueueEvent::ActionCompleted { id } => Some(id),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec![urgent.id, low.id]);
    }

    #[tokio::test]
    async fn failed_action_stays_pending_with_retry_recorded() {
        let harness = Harness::new().await;
        harness
            .store
            .call(|conn| {
                queries::insert_pending_action(
                    conn,
                    &NewPendingAction::new("profile", "/profile", "PUT", None),
                )
            })
            .await
            .unwrap();

        let addr = stub_server(vec![(500, r#"{"error":"boom"}"#.to_string())]).await;
        let engine = harness.engine_at(addr, SyncEngineConfig::default());

        let report = engine.sync_actions().await.unwrap();
        assert_eq!(report, SyncReport { sent: 0, failed: 1 });

        let actions = harness
            .store
            .call(queries::get_pending_actions)
            .await
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].retries, 1);
        assert!(actions[0].last_error.is_some());
    }

    #[tokio::test]
    async fn refresh_contacts_replaces_the_snapshot() {
        let harness = Harness::new().await;
        // Seed a stale snapshot
        harness
            .store
            .call(|conn| {
                queries::replace_contacts(
                    conn,
                    &[NewCachedContact {
                        id: "old".to_string(),
                        email: "old@cinq.app".to_string(),
                        display_name: None,
                    }],
                )
            })
            .await
            .unwrap();

        let addr = stub_server(vec![(
            200,
            r#"{"success":true,"contacts":[
                {"id":"c1","email":"a@cinq.app","display_name":"Ava"},
                {"id":"c2","email":"b@cinq.app"}
            ]}"#
            .to_string(),
        )])
        .await;
        let engine = harness.engine_at(addr, SyncEngineConfig::default());

        let count = engine.refresh_contacts().await.unwrap();
        assert_eq!(count, 2);

        let contacts = harness
            .store
            .call(queries::list_contacts)
            .await
            .unwrap();
        assert_eq!(contacts.len(), 2);
        assert!(contacts.iter().all(|c| c.id != "old"));
        assert!(harness
            .sink
            .events()
            .contains(&QueueEvent::ContactsCached { count: 2 }));
    }

    #[tokio::test]
    async fn refresh_contacts_without_session_keeps_stale_cache() {
        let harness = Harness::new().await;
        harness
            .store
            .call(|conn| {
                queries::replace_contacts(
                    conn,
                    &[NewCachedContact {
                        id: "old".to_string(),
                        email: "old@cinq.app".to_string(),
                        display_name: None,
                    }],
                )
            })
            .await
            .unwrap();

        let engine = SyncEngine::new(
            harness.store.clone(),
            DeliveryClient::new("http://127.0.0.1:1", "anon"),
            Arc::new(NoSession),
            harness.sink.clone(),
            SyncEngineConfig::default(),
        );

        let count = engine.refresh_contacts().await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(
            harness
                .store
                .call(queries::list_contacts)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(harness.sink.is_empty());
    }

    #[test]
    fn default_config_bounds_retries() {
        let config = SyncEngineConfig::default();
        assert!(config.max_retries > 0);
    }
}
