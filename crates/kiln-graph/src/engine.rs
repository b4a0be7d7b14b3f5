//! HMR engine: dependency graph, client registry and debounced broadcasting.
//!
//! One engine belongs to one server instance. Messages produced by bubbling are
//! queued; a single background task flushes the queue once no new message has
//! arrived for the debounce window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::graph::{DependencyGraph, DependencyNode};
use crate::message::{ClientMessage, HmrMessage, collapse_batch};

/// Default debounce window for batching client messages.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Per-client outbound buffer.
const CLIENT_BUFFER: usize = 100;

/// Connected clients: id -> outbound JSON payloads.
type ClientRegistry = RwLock<HashMap<usize, mpsc::Sender<String>>>;

/// Hot module replacement engine.
///
/// Must be created inside a Tokio runtime; the debounce task is spawned on
/// construction and exits when the engine is dropped.
pub struct HmrEngine {
    graph: RwLock<DependencyGraph>,
    clients: ClientRegistry,
    next_client_id: AtomicUsize,
    queue: Mutex<Vec<HmrMessage>>,
    wake: mpsc::UnboundedSender<()>,
}

impl std::fmt::Debug for HmrEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmrEngine")
            .field("modules", &self.graph.read().len())
            .field("clients", &self.client_count())
            .field("queued", &self.queue.lock().len())
            .finish()
    }
}

impl HmrEngine {
    /// Create an engine whose batches flush after `debounce` of quiet.
    pub fn new(debounce: Duration) -> Arc<Self> {
        let (wake, wake_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            graph: RwLock::new(DependencyGraph::new()),
            clients: RwLock::new(HashMap::new()),
            next_client_id: AtomicUsize::new(0),
            queue: Mutex::new(Vec::new()),
            wake,
        });

        tokio::spawn(debounce_loop(Arc::downgrade(&engine), wake_rx, debounce));
        engine
    }

    // ------------------------------------------------------------------
    // Graph
    // ------------------------------------------------------------------

    pub fn set_entry<I, S>(&self, url: &str, imports: I, is_hmr_enabled: bool)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.graph.write().set_entry(url, imports, is_hmr_enabled);
    }

    /// Snapshot of the node for `url`.
    pub fn get_entry(&self, url: &str) -> Option<DependencyNode> {
        self.graph.read().get_entry(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.graph.read().contains(url)
    }

    pub fn needs_replacement(&self, url: &str) -> bool {
        self.graph
            .read()
            .get_entry(url)
            .is_some_and(DependencyNode::needs_replacement)
    }

    pub fn mark_entry_for_replacement(&self, url: &str, state: bool) {
        self.graph.write().mark_entry_for_replacement(url, state);
    }

    /// Mark `url` as an update boundary.
    pub fn accept(&self, url: &str) {
        self.graph.write().accept(url);
    }

    /// Bubble a change to `url` and queue the resulting messages.
    pub fn update_or_bubble(&self, url: &str) {
        let messages = self.graph.write().bubble(url);
        tracing::debug!(url, count = messages.len(), "bubbled module change");
        for message in messages {
            self.enqueue(message);
        }
    }

    pub fn broadcast_reload(&self) {
        self.enqueue(HmrMessage::Reload);
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Queue a message and extend the debounce window.
    pub fn enqueue(&self, message: HmrMessage) {
        self.queue.lock().push(message);
        // The loop only stops once the engine is gone.
        let _ = self.wake.send(());
    }

    /// Deliver the queued batch to every client now.
    ///
    /// Clients whose channel is closed are pruned. A client with a full buffer
    /// misses this batch but stays connected.
    pub fn flush(&self) {
        let batch = collapse_batch(std::mem::take(&mut *self.queue.lock()));
        if batch.is_empty() {
            return;
        }

        let payloads: Vec<String> = batch
            .iter()
            .filter_map(|message| serde_json::to_string(message).ok())
            .collect();

        let clients = self.clients.read().clone();
        let mut failed_ids = Vec::new();

        for (id, tx) in clients {
            for payload in &payloads {
                match tx.try_send(payload.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Closed(_)) => {
                        failed_ids.push(id);
                        break;
                    }
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(client = id, "HMR client is not keeping up, dropping message");
                    }
                }
            }
        }

        for id in failed_ids {
            tracing::debug!(client = id, "pruning disconnected HMR client");
            self.unregister_client(id);
        }

        tracing::debug!(messages = payloads.len(), "flushed HMR batch");
    }

    /// Handle a raw text frame from a client. Malformed messages are dropped.
    pub fn handle_client_message(&self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::HotAccept { id }) => {
                let url = strip_query(&id);
                tracing::debug!(url, "module accepted hot updates");
                self.graph.write().accept(url);
            }
            Err(err) => {
                tracing::debug!(%err, "ignoring malformed HMR client message");
            }
        }
    }

    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    /// Register a client and return its id and message receiver.
    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.clients.write().insert(id, tx);
        (id, rx)
    }

    pub fn unregister_client(&self, id: usize) {
        self.clients.write().remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }
}

/// Wait for the first message, then keep extending the window until it has
/// been quiet for `window`, then flush.
async fn debounce_loop(
    engine: Weak<HmrEngine>,
    mut wake: mpsc::UnboundedReceiver<()>,
    window: Duration,
) {
    while wake.recv().await.is_some() {
        loop {
            tokio::select! {
                more = wake.recv() => {
                    if more.is_none() {
                        return;
                    }
                }
                _ = tokio::time::sleep(window) => break,
            }
        }

        let Some(engine) = engine.upgrade() else {
            return;
        };
        engine.flush();
    }
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}
