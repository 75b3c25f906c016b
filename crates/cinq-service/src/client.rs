//! The process-wide offline client.

use crate::{Config, ServiceResult, SessionTokens};
use cinq_connectivity::{ConnectivityWatcher, SyncRegistrar, WorkerMessage};
use cinq_queue::OutboundQueue;
use cinq_status::{StatusReporter, StatusSnapshot};
use cinq_store::{queries, EventSink, SharedStore, Store};
use cinq_sync_engine::{
    AccessTokenProvider, DeliveryClient, SyncEngine, SyncEngineConfig, SyncReport,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Buffered worker messages before senders start waiting.
const WORKER_QUEUE_CAPACITY: usize = 32;

/// One process-wide service instance owning the offline queue stack.
///
/// Explicit `init`/`shutdown` replace ambient globals: consumers receive the
/// queue, engine, and status handles from this context instead of reaching
/// for module state. Connectivity transitions, background-worker messages,
/// and explicit calls all converge on the same sync entry points.
pub struct OfflineClient {
    store: Store,
    queue: Arc<OutboundQueue>,
    engine: Arc<SyncEngine>,
    status: StatusReporter,
    connectivity: Arc<ConnectivityWatcher>,
    tokens: Arc<SessionTokens>,
    worker_tx: mpsc::Sender<WorkerMessage>,
    trigger_task: JoinHandle<()>,
}

impl OfflineClient {
    /// Open the store (single-flight), recover any rows left `sending` by a
    /// previous run, wire the components, and start the trigger loop.
    ///
    /// The client starts offline; the host signals connectivity through
    /// [`set_online`](Self::set_online).
    pub async fn init(
        config: &Config,
        store_path: &Path,
        sink: Arc<dyn EventSink>,
        registrar: Arc<dyn SyncRegistrar>,
    ) -> ServiceResult<Self> {
        let shared = SharedStore::new(store_path.to_path_buf());
        let store = shared.get().await?.clone();

        let recovered = store.call(queries::reset_sending_messages).await?;
        if recovered > 0 {
            info!(count = recovered, "Recovered in-flight messages to pending");
        }

        let tokens = Arc::new(SessionTokens::new());
        let queue = Arc::new(OutboundQueue::new(store.clone(), sink.clone(), registrar));
        let delivery = DeliveryClient::new(config.api_url.clone(), config.anon_key.clone());
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            delivery,
            tokens.clone() as Arc<dyn AccessTokenProvider>,
            sink.clone(),
            SyncEngineConfig::default(),
        ));
        let connectivity = Arc::new(ConnectivityWatcher::new(false, sink));
        let status = StatusReporter::new(store.clone(), connectivity.subscribe());

        let (worker_tx, worker_rx) = mpsc::channel(WORKER_QUEUE_CAPACITY);
        let trigger_task = spawn_trigger_loop(
            engine.clone(),
            status.clone(),
            connectivity.subscribe(),
            worker_rx,
        );

        info!(store = %store.path(), "Offline client initialized");

        Ok(Self {
            store,
            queue,
            engine,
            status,
            connectivity,
            tokens,
            worker_tx,
            trigger_task,
        })
    }

    /// The queueing API.
    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// The session token slot.
    pub fn tokens(&self) -> &SessionTokens {
        &self.tokens
    }

    /// Signal a connectivity change. An offline→online transition triggers
    /// a drain of both queues.
    pub fn set_online(&self, online: bool) {
        self.connectivity.set_online(online);
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Sender for background-worker messages.
    pub fn worker_sender(&self) -> mpsc::Sender<WorkerMessage> {
        self.worker_tx.clone()
    }

    /// Explicit trigger: drain messages then actions.
    pub async fn sync_now(&self) -> ServiceResult<(SyncReport, SyncReport)> {
        Ok(self.engine.sync_all().await?)
    }

    /// Replace the contact cache from the contacts endpoint.
    pub async fn refresh_contacts(&self) -> ServiceResult<usize> {
        Ok(self.engine.refresh_contacts().await?)
    }

    /// Current aggregate status.
    pub async fn status(&self) -> ServiceResult<StatusSnapshot> {
        Ok(self.status.snapshot().await?)
    }

    /// Stop the trigger loop and close the store.
    pub async fn shutdown(self) -> ServiceResult<()> {
        let OfflineClient {
            store,
            trigger_task,
            ..
        } = self;
        trigger_task.abort();
        store.close().await?;
        info!("Offline client shut down");
        Ok(())
    }
}

impl std::fmt::Debug for OfflineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineClient")
            .field("store", &self.store.path())
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}

/// React to connectivity transitions and worker messages.
fn spawn_trigger_loop(
    engine: Arc<SyncEngine>,
    status: StatusReporter,
    mut online_rx: watch::Receiver<bool>,
    mut worker_rx: mpsc::Receiver<WorkerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut was_online = *online_rx.borrow();
        loop {
            tokio::select! {
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *online_rx.borrow();
                    if online && !was_online {
                        debug!("Connectivity restored, draining queues");
                        if let Err(err) = engine.sync_messages().await {
                            warn!(error = %err, "Reconnect message sync failed");
                        }
                        if let Err(err) = engine.sync_actions().await {
                            warn!(error = %err, "Reconnect action sync failed");
                        }
                    }
                    was_online = online;
                }
                message = worker_rx.recv() => {
                    match message {
                        Some(WorkerMessage::SyncMessages) => {
                            if let Err(err) = engine.sync_messages().await {
                                warn!(error = %err, "Worker-triggered message sync failed");
                            }
                        }
                        Some(WorkerMessage::SyncActions) => {
                            if let Err(err) = engine.sync_actions().await {
                                warn!(error = %err, "Worker-triggered action sync failed");
                            }
                        }
                        Some(WorkerMessage::SyncStatus) => match status.snapshot().await {
                            Ok(snapshot) => info!(
                                pending_messages = snapshot.pending_messages,
                                pending_actions = snapshot.pending_actions,
                                online = snapshot.is_online,
                                "Queue status requested"
                            ),
                            Err(err) => warn!(error = %err, "Status snapshot failed"),
                        },
                        None => break,
                    }
                }
            }
        }
        debug!("Trigger loop stopped");
    })
}
