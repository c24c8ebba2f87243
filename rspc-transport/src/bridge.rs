//! Host-bridge link.
//!
//! For clients embedded in a host application that relays rspc traffic over
//! a named event channel instead of a socket. Requests of one scheduling
//! tick are emitted as a JSON array on [`TRANSPORT_CHANNEL`]; envelopes come
//! back one per event on [`RESPONSE_CHANNEL`].

use crate::multiplex::{Outbound, StreamOperation};
use async_trait::async_trait;
use dashmap::DashMap;
use rspc_core::{
    BatchQueue, Link, LinkError, LinkResult, Next, Operation, PendingRegistry, Request, Response,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Channel carrying outbound request batches to the host.
pub const TRANSPORT_CHANNEL: &str = "plugin:rspc:transport";
/// Channel carrying response envelopes back from the host.
pub const RESPONSE_CHANNEL: &str = "plugin:rspc:transport:resp";

/// Event channel provided by the host application.
#[async_trait]
pub trait HostBridge: Send + Sync {
    /// Publish `payload` on `channel`.
    async fn emit(&self, channel: &str, payload: Value) -> Result<(), LinkError>;

    /// Subscribe to events published on `channel`.
    fn listen(&self, channel: &str) -> mpsc::UnboundedReceiver<Value>;
}

/// In-process bridge: emitted events are handed to a receiver, delivered
/// events fan out to every listener of the channel.
#[derive(Debug)]
pub struct LocalBridge {
    emitted: mpsc::UnboundedSender<(String, Value)>,
    listeners: DashMap<String, Vec<mpsc::UnboundedSender<Value>>>,
}

impl LocalBridge {
    /// Create a bridge and the receiving end of everything emitted through it.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Value)>) {
        let (emitted, rx) = mpsc::unbounded_channel();
        let bridge = Arc::new(Self {
            emitted,
            listeners: DashMap::new(),
        });
        (bridge, rx)
    }

    /// Deliver an event to the listeners of `channel`. Returns how many
    /// listeners received it.
    pub fn deliver(&self, channel: &str, payload: Value) -> usize {
        let Some(mut listeners) = self.listeners.get_mut(channel) else {
            return 0;
        };
        listeners.retain(|tx| !tx.is_closed());
        listeners
            .iter()
            .filter(|tx| tx.send(payload.clone()).is_ok())
            .count()
    }
}

#[async_trait]
impl HostBridge for LocalBridge {
    async fn emit(&self, channel: &str, payload: Value) -> Result<(), LinkError> {
        self.emitted
            .send((channel.to_string(), payload))
            .map_err(|_| LinkError::Transport("host bridge is closed".to_string()))
    }

    fn listen(&self, channel: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.entry(channel.to_string()).or_default().push(tx);
        rx
    }
}

struct Listener(JoinHandle<()>);

impl Drop for Listener {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Terminating link relaying operations through a [`HostBridge`].
#[derive(Clone)]
pub struct BridgeLink {
    registry: Arc<PendingRegistry>,
    queue: BatchQueue<Request>,
    _listener: Arc<Listener>,
}

impl BridgeLink {
    /// Start listening for responses. Must be called inside a tokio runtime.
    pub fn new(bridge: Arc<dyn HostBridge>) -> Self {
        let registry = Arc::new(PendingRegistry::new());

        let mut responses = bridge.listen(RESPONSE_CHANNEL);
        let inbound = registry.clone();
        let listener = tokio::spawn(async move {
            while let Some(payload) = responses.recv().await {
                match serde_json::from_value::<Response>(payload) {
                    Ok(response) => inbound.dispatch(response),
                    Err(e) => error!("rspc: malformed envelope from host bridge: {}", e),
                }
            }
            debug!("rspc: host bridge response channel closed");
        });

        let queue = BatchQueue::new(move |batch: Vec<Request>| {
            let bridge = bridge.clone();
            async move {
                let payload = match serde_json::to_value(&batch) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("rspc: failed to encode batch for host bridge: {}", e);
                        return;
                    }
                };
                if let Err(e) = bridge.emit(TRANSPORT_CHANNEL, payload).await {
                    error!("rspc: failed to emit to {}: {}", TRANSPORT_CHANNEL, e);
                }
            }
        });

        Self {
            registry,
            queue,
            _listener: Arc::new(Listener(listener)),
        }
    }

    pub fn registry(&self) -> &Arc<PendingRegistry> {
        &self.registry
    }
}

impl std::fmt::Debug for BridgeLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeLink")
            .field("in_flight", &self.registry.len())
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl Link for BridgeLink {
    fn call(&self, op: Arc<Operation>, _next: Next) -> Box<dyn LinkResult> {
        Box::new(StreamOperation::new(
            op,
            self.registry.clone(),
            Outbound::Batched(self.queue.clone()),
        ))
    }
}
