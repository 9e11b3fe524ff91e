//! Error types for the offline worker

use thiserror::Error;

/// Result type alias for worker operations
pub type SwResult<T> = Result<T, SwError>;

/// Main error type for the offline worker
#[derive(Error, Debug)]
pub enum SwError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Push error: {0}")]
    Push(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl SwError {
    /// Create a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new lifecycle state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new push error
    pub fn push(msg: impl Into<String>) -> Self {
        Self::Push(msg.into())
    }

    /// Short label used as the `category` field in structured logs.
    pub fn category(&self) -> &'static str {
        match self {
            SwError::Network(_) => "network",
            SwError::Cache(_) => "cache",
            SwError::Storage(_) => "storage",
            SwError::State(_) => "state",
            SwError::Config(_) => "config",
            SwError::Push(_) => "push",
            SwError::NotFound(_) => "not_found",
            SwError::Io(_) => "io",
            SwError::Json(_) => "json",
            SwError::Url(_) => "url",
        }
    }
}
