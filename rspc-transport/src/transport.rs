use thiserror::Error;

/// Invalid link or connection configuration, reported when a link is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Backoff schedule must contain at least one delay")]
    EmptyBackoff,
    #[error("Backoff delay at index {index} is shorter than the one before it")]
    DecreasingBackoff { index: usize },
    #[error("Batch size must be at least 1")]
    ZeroBatchSize,
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}
