use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure reported by the server for a single operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RspcError {
    pub code: i32,
    pub message: String,
}

impl RspcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        RspcError {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RspcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RspcError (code: {}): {}", self.code, self.message)
    }
}

impl std::error::Error for RspcError {}

/// Everything that can end an operation unsuccessfully inside a link chain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error(transparent)]
    Rpc(#[from] RspcError),

    #[error(
        "Subscribing to '{path}' failed as the HTTP transport does not support subscriptions! Maybe try using the websocket transport?"
    )]
    Unsupported { path: String },

    #[error("Expected 'input' to be of type 'string' or 'number' for 'subscriptionStop', but got {0}")]
    InvalidSubscriptionStop(String),

    #[error("no terminating link was attached! Did you forget to add a 'HttpLink' or 'WsLink' link?")]
    NoTerminatingLink,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Operation was dropped before it completed")]
    Dropped,
}

impl LinkError {
    /// The typed server failure, if this is one.
    pub fn as_rpc(&self) -> Option<&RspcError> {
        match self {
            LinkError::Rpc(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::Codec(err.to_string())
    }
}
