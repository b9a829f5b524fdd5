use thiserror::Error;

/// Top-level error type for distributor/supervisor operations.
#[derive(Debug, Error)]
pub enum DistQueueError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("distributor request failed: {0}")]
    Distributor(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

/// Result type alias for distributor/supervisor operations.
pub type Result<T> = std::result::Result<T, DistQueueError>;
