use std::time::Duration;

use driftline_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Listing failed: {0}")]
    Listing(String),

    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    #[error("Cannot derive partition key for '{uri}': {reason}")]
    PartitionKey { uri: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Failures surfaced by a state backing store. `Timeout` is kept distinct so
/// callers can decide whether stale data is acceptable for the current cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("timed out after {0:?} while reading to the end of the state log")]
    Timeout(Duration),

    #[error("state store is not started")]
    NotStarted,

    #[error("state store is closed")]
    Closed,
}

impl StoreError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
