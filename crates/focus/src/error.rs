//! Error types for the focus library

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the persisted key-value store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt data in {partition} storage: {source}")]
    Corrupt {
        partition: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode value for key '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Focus-specific errors
#[derive(Error, Debug)]
pub enum FocusError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Rule installation failed: {0}")]
    RuleInstallation(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T, E = FocusError> = std::result::Result<T, E>;
