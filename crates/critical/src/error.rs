//! Error types for the critical CSS filter

use thiserror::Error;

/// Property store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Property store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt value for {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Filter setup result type
pub type FilterResult<T> = Result<T, FilterError>;

/// Filter setup errors
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Config(#[from] serde_json::Error),
}
