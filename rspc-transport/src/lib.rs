// rspc transports
// Terminating links: single-shot and batched HTTP, single and batched
// WebSocket over a reconnecting connection manager, and a host event bridge.

pub mod bridge;
#[cfg(feature = "http")]
pub mod headers;
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub mod http_batch;
mod multiplex;
pub mod reconnect;
pub mod transport;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use bridge::{BridgeLink, HostBridge, LocalBridge, RESPONSE_CHANNEL, TRANSPORT_CHANNEL};
#[cfg(feature = "http")]
pub use headers::HeaderSource;
#[cfg(feature = "http")]
pub use http::{HttpLink, HttpLinkConfig};
#[cfg(feature = "http")]
pub use http_batch::{HttpBatchLink, HttpBatchLinkConfig, BATCH_ROUTE};
pub use reconnect::{BackoffConfig, ConnectionState, ReconnectController};
pub use transport::ConfigError;
#[cfg(feature = "websocket")]
pub use websocket::{WsBatchLink, WsConfig, WsLink, WsManager};
