use rspc_core::{LinkError, RspcError};
use thiserror::Error;

/// Errors surfaced by [`Client`](crate::Client) calls.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Must provide at least one link")]
    NoLinks,

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Failed to decode result: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// The server-reported failure, if that is what this is.
    pub fn as_rpc(&self) -> Option<&RspcError> {
        match self {
            ClientError::Link(err) => err.as_rpc(),
            _ => None,
        }
    }
}
