//! Background sync worker.
//!
//! One task per session context. It owns the [`SyncStore`] and the current
//! [`HdioClient`], and processes [`WorkerMessage`]s strictly in arrival
//! order, so a pass never overlaps another pass or an upload. Progress is
//! published as [`WorkerEvent`]s on a broadcast channel.
//!
//! ```text
//! producers ──▶ Debouncer ──▶ mpsc ──▶ Worker ──▶ broadcast ──▶ subscribers
//!                                        │
//!                                        └──▶ HdioClient ──▶ HTTP
//! ```

use crate::client::{ClientState, HdioClient, UploadReceipt};
use crate::config::{Identity, WorkerConfig};
use crate::debounce::Debouncer;
use crate::error::{SyncError, SyncResult};
use crate::http::HttpClient;
use crate::store::SyncStore;
use hdio_protocol::{HdmlParser, MarkupParser, ResolveError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Inbound worker message.
///
/// JSON form: `{"type":"props","data":{"host":..,"tenant":..,"token":..}}`
/// or `{"type":"html","data":{"html":".."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// New identity; starts a new session.
    Props(Identity),
    /// New markup snapshot; triggers one pass.
    Html(HtmlSnapshot),
}

/// Markup carried by an `html` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlSnapshot {
    /// Full markup of the document.
    pub html: String,
}

impl WorkerMessage {
    /// Creates a `props` message.
    pub fn props(identity: Identity) -> Self {
        WorkerMessage::Props(identity)
    }

    /// Creates an `html` message.
    pub fn html(html: impl Into<String>) -> Self {
        WorkerMessage::Html(HtmlSnapshot { html: html.into() })
    }

    /// Decodes a message from its JSON form.
    pub fn from_json(text: &str) -> SyncResult<Self> {
        serde_json::from_str(text).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }

    /// Returns the message type name.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::Props(_) => "props",
            WorkerMessage::Html(_) => "html",
        }
    }
}

/// Outbound worker event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A `props` message replaced the session.
    SessionStarted {
        /// Tenant of the new session.
        tenant: String,
        /// Client state right after construction.
        state: ClientState,
    },
    /// A resolver pass completed.
    Resolved {
        /// Pass number within the session, starting at 1.
        pass: u64,
        /// Entities bundled by this pass.
        added: usize,
        /// Entities in the pending batch, including earlier unsent ones.
        pending: usize,
        /// Entities that failed to resolve.
        errors: Vec<ResolveError>,
    },
    /// The pending batch was uploaded and acknowledged.
    Uploaded(UploadReceipt),
    /// Parsing, resolution or upload failed. The worker keeps running.
    Failed(SyncError),
}

/// The sync worker. Build with [`Worker::new`], start with [`Worker::spawn`].
pub struct Worker {
    config: WorkerConfig,
    http: Arc<dyn HttpClient>,
    parser: Box<dyn MarkupParser>,
    store: SyncStore,
    client: Option<HdioClient>,
    events: broadcast::Sender<WorkerEvent>,
    cancel: CancellationToken,
}

impl Worker {
    /// Creates a worker using the HDML parser.
    pub fn new(config: WorkerConfig, http: Arc<dyn HttpClient>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            http,
            parser: Box::new(HdmlParser::new()),
            store: SyncStore::new(),
            client: None,
            events,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the markup parser.
    pub fn with_parser(mut self, parser: impl MarkupParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Ties the worker's lifetime to `parent`.
    pub fn with_cancel(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Spawns the worker task on the current runtime.
    pub fn spawn(self) -> WorkerHandle {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let handle_events = self.events.clone();
        let cancel = self.cancel.clone();
        let debounce = self.config.debounce;
        let task = tokio::spawn(self.run(rx));
        WorkerHandle {
            tx,
            events: handle_events,
            cancel,
            debounce,
            task,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<WorkerMessage>) {
        info!("sync worker started");
        loop {
            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            debug!(kind = message.kind(), "worker message");
            self.handle(message).await;
        }
        if let Some(client) = self.client.take() {
            client.close();
        }
        info!(passes = self.store.passes(), "sync worker stopped");
    }

    async fn handle(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Props(identity) => self.start_session(identity),
            WorkerMessage::Html(snapshot) => self.sync(&snapshot.html).await,
        }
    }

    fn start_session(&mut self, identity: Identity) {
        if let Some(previous) = self.client.take() {
            previous.close();
        }
        self.store = SyncStore::new();

        let client = HdioClient::with_cancel(
            identity.to_config(self.config.timeout),
            Arc::clone(&self.http),
            &self.cancel,
        );
        let state = client.state();
        info!(host = %identity.host, tenant = %identity.tenant, ?state, "session started");
        self.client = Some(client);
        self.emit(WorkerEvent::SessionStarted {
            tenant: identity.tenant,
            state,
        });
    }

    async fn sync(&mut self, html: &str) {
        let document = match self.parser.parse(html) {
            Ok(document) => document,
            Err(e) => {
                error!(error = %e, "failed to parse markup");
                self.emit(WorkerEvent::Failed(e.into()));
                return;
            }
        };

        let resolution = match self.store.resolve(&document) {
            Ok(resolution) => resolution,
            Err(e) => {
                error!(error = %e, "resolver pass failed");
                self.emit(WorkerEvent::Failed(e));
                return;
            }
        };
        self.emit(WorkerEvent::Resolved {
            pass: self.store.passes(),
            added: resolution.batch.len(),
            pending: self.store.pending_count(),
            errors: resolution.errors,
        });

        if self.store.pending_count() == 0 {
            debug!("nothing to upload");
            return;
        }
        let Some(client) = self.client.as_ref() else {
            debug!(pending = self.store.pending_count(), "no session, upload deferred");
            return;
        };
        if client.state() == ClientState::Uninitialized {
            debug!(pending = self.store.pending_count(), "client uninitialized, upload deferred");
            return;
        }

        match client.post_batch(&mut self.store).await {
            Ok(receipt) => self.emit(WorkerEvent::Uploaded(receipt)),
            Err(e) => {
                error!(error = %e, "failed to upload batch");
                self.emit(WorkerEvent::Failed(e));
            }
        }
    }

    fn emit(&self, event: WorkerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Handle to a running [`Worker`].
#[derive(Debug)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerMessage>,
    events: broadcast::Sender<WorkerEvent>,
    cancel: CancellationToken,
    debounce: std::time::Duration,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Sends a message, waiting for channel capacity.
    pub async fn send(&self, message: WorkerMessage) -> SyncResult<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| SyncError::WorkerStopped)
    }

    /// Returns a sender for producers that outlive a borrow of the handle.
    pub fn sender(&self) -> mpsc::Sender<WorkerMessage> {
        self.tx.clone()
    }

    /// Spawns a debouncer feeding this worker with the configured window.
    ///
    /// Use one debouncer per producer, so markup updates never swallow an
    /// identity change.
    pub fn debouncer(&self) -> Debouncer<WorkerMessage> {
        Debouncer::spawn(self.debounce, self.tx.clone())
    }

    /// Subscribes to worker events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Returns true once the worker task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the worker to drain every queued message and exit.
    ///
    /// The worker exits once every sender, including those handed out by
    /// [`WorkerHandle::sender`] and debouncers, is gone.
    pub async fn join(self) {
        drop(self.tx);
        let _ = self.task.await;
    }

    /// Stops the worker without draining, closing its client and aborting
    /// any upload in flight.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Spawns a worker with the HDML parser.
pub fn spawn_worker(config: WorkerConfig, http: Arc<dyn HttpClient>) -> WorkerHandle {
    Worker::new(config, http).spawn()
}
