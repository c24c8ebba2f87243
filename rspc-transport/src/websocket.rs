//! Persistent WebSocket links.
//!
//! A [`WsManager`] owns one long-lived connection, the correlation registry
//! for everything sent over it and the reconnection policy. [`WsLink`] sends
//! each operation as its own frame; [`WsBatchLink`] sends a JSON array per
//! scheduling tick.

use crate::multiplex::{Outbound, StreamOperation};
use crate::reconnect::{BackoffConfig, ConnectionState, ReconnectController};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rspc_core::{
    decode_frame, encode_batch, encode_request, BatchQueue, Link, LinkResult, Next, Operation,
    PendingRegistry, Request,
};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// WebSocket connection configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Server endpoint, `ws://` or `wss://`
    pub url: String,
    /// Reconnection schedule
    pub backoff: BackoffConfig,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:4000/rspc/ws".to_string(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl WsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

struct Shared {
    url: String,
    registry: Arc<PendingRegistry>,
    writer: Mutex<Option<WsWriter>>,
    state: watch::Sender<ConnectionState>,
    reconnect: ReconnectController,
    shutdown: CancellationToken,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    async fn wait_open(&self) -> bool {
        let mut state = self.state.subscribe();
        loop {
            if state.borrow_and_update().is_open() {
                return true;
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                changed = state.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    /// Connect, read until the socket goes away, back off, repeat.
    async fn run(self: Arc<Self>) {
        loop {
            self.set_state(ConnectionState::Connecting);
            let attempt = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                attempt = connect_async(self.url.as_str()) => attempt,
            };

            match attempt {
                Ok((stream, _)) => {
                    self.reconnect.record_open();
                    let (writer, reader) = stream.split();
                    *self.writer.lock().await = Some(writer);
                    self.set_state(ConnectionState::Open);
                    info!("rspc: websocket connected to {}", self.url);

                    self.read_frames(reader).await;

                    self.set_state(ConnectionState::Closed { retrying: true });
                    if let Some(mut writer) = self.writer.lock().await.take() {
                        let _ = writer.close().await;
                    }
                    info!("rspc: websocket to {} closed", self.url);
                }
                Err(e) => {
                    let failures = self.reconnect.record_failure();
                    warn!(
                        "rspc: websocket connection to {} failed ({} in a row): {}",
                        self.url, failures, e
                    );
                    self.set_state(ConnectionState::Closed { retrying: true });
                }
            }

            if self.shutdown.is_cancelled() {
                break;
            }
            let delay = self.reconnect.next_delay();
            debug!("rspc: reconnecting in {:?}", delay);
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.close().await;
        }
        self.set_state(ConnectionState::Closed { retrying: false });
        debug!("rspc: websocket manager for {} stopped", self.url);
    }

    async fn read_frames(&self, mut reader: WsReader) {
        loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                message = reader.next() => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => self.handle_frame(text),
                    Err(_) => warn!("rspc: ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("rspc: websocket error: {}", e);
                    return;
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        trace!("rspc: inbound frame: {}", text);
        match decode_frame(text) {
            Ok(responses) => {
                for response in responses {
                    self.registry.dispatch(response);
                }
            }
            Err(e) => error!("rspc: failed to decode inbound frame: {}", e),
        }
    }

    /// Drain outbound frames in order, each one waiting for an open socket.
    async fn pump(self: Arc<Self>, mut outbound: mpsc::UnboundedReceiver<String>) {
        while let Some(payload) = outbound.recv().await {
            loop {
                if !self.wait_open().await {
                    return;
                }
                let mut writer = self.writer.lock().await;
                if let Some(sink) = writer.as_mut() {
                    trace!("rspc: outbound frame: {}", payload);
                    if let Err(e) = sink.send(Message::text(payload)).await {
                        error!("rspc: failed to write websocket frame: {}", e);
                    }
                    break;
                }
                drop(writer);
                tokio::task::yield_now().await;
            }
        }
    }
}

/// Owner of a persistent WebSocket connection.
///
/// Dropping the last handle (or calling [`WsManager::shutdown`]) closes the
/// socket and stops reconnecting.
pub struct WsManager {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<String>,
}

impl WsManager {
    /// Start connecting in the background. Must be called inside a tokio
    /// runtime.
    pub fn new(config: WsConfig) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let shared = Arc::new(Shared {
            url: config.url,
            registry: Arc::new(PendingRegistry::new()),
            writer: Mutex::new(None),
            state,
            reconnect: ReconnectController::new(config.backoff),
            shutdown: CancellationToken::new(),
        });
        let (outbound, rx) = mpsc::unbounded_channel();

        tokio::spawn(shared.clone().run());
        tokio::spawn(shared.clone().pump(rx));

        Arc::new(Self { shared, outbound })
    }

    pub fn registry(&self) -> Arc<PendingRegistry> {
        self.shared.registry.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Consecutive failed connection attempts since the last open.
    pub fn failures(&self) -> u32 {
        self.shared.reconnect.failures()
    }

    /// Resolves once the connection is open; false if it was shut down first.
    pub async fn wait_open(&self) -> bool {
        self.shared.wait_open().await
    }

    /// Queue a text frame.
    ///
    /// All frames share one ordered queue drained by a single writer task,
    /// which waits for an open socket before each write. A stop therefore
    /// never overtakes its start, and a write that stalls delays every frame
    /// queued behind it.
    pub fn send(&self, payload: String) {
        if self.outbound.send(payload).is_err() {
            warn!("rspc: websocket manager is shut down, dropping frame");
        }
    }

    pub(crate) fn send_request(&self, req: &Request) {
        match encode_request(req) {
            Ok(payload) => self.send(payload),
            Err(e) => error!("rspc: failed to encode request '{}': {}", req.id, e),
        }
    }

    pub(crate) fn send_batch(&self, reqs: &[Request]) {
        match encode_batch(reqs) {
            Ok(payload) => self.send(payload),
            Err(e) => error!("rspc: failed to encode batch: {}", e),
        }
    }

    /// Close the socket and stop reconnecting.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }
}

impl Drop for WsManager {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl std::fmt::Debug for WsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsManager")
            .field("url", &self.shared.url)
            .field("state", &self.state())
            .field("pending", &self.shared.registry.len())
            .finish()
    }
}

fn direct(manager: &Arc<WsManager>) -> Outbound {
    let manager = manager.clone();
    Outbound::Direct(Arc::new(move |req: Request| manager.send_request(&req)))
}

/// Terminating link sending one frame per operation.
#[derive(Clone, Debug)]
pub struct WsLink {
    manager: Arc<WsManager>,
}

impl WsLink {
    pub fn new(config: WsConfig) -> Self {
        Self::with_manager(WsManager::new(config))
    }

    pub fn with_manager(manager: Arc<WsManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<WsManager> {
        &self.manager
    }
}

impl Link for WsLink {
    fn call(&self, op: Arc<Operation>, _next: Next) -> Box<dyn LinkResult> {
        Box::new(StreamOperation::new(
            op,
            self.manager.registry(),
            direct(&self.manager),
        ))
    }
}

/// Terminating link coalescing each tick's operations into one frame.
///
/// Operations whose context sets `skipBatch` get a frame of their own.
#[derive(Clone)]
pub struct WsBatchLink {
    manager: Arc<WsManager>,
    queue: BatchQueue<Request>,
}

impl WsBatchLink {
    pub fn new(config: WsConfig) -> Self {
        Self::with_manager(WsManager::new(config))
    }

    pub fn with_manager(manager: Arc<WsManager>) -> Self {
        let sender = manager.clone();
        let queue = BatchQueue::new(move |batch: Vec<Request>| {
            sender.send_batch(&batch);
            futures::future::ready(())
        });
        Self { manager, queue }
    }

    pub fn manager(&self) -> &Arc<WsManager> {
        &self.manager
    }

    /// Number of requests waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl std::fmt::Debug for WsBatchLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsBatchLink")
            .field("manager", &self.manager)
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl Link for WsBatchLink {
    fn call(&self, op: Arc<Operation>, _next: Next) -> Box<dyn LinkResult> {
        let outbound = if op.context.skip_batch() {
            direct(&self.manager)
        } else {
            Outbound::Batched(self.queue.clone())
        };
        Box::new(StreamOperation::new(op, self.manager.registry(), outbound))
    }
}
