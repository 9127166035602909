//! Error types for data store operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for data store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during data store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A value could not be serialized for storage.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record could not be read back.
    #[error("corrupted record at {path}: {message}")]
    Corrupted {
        /// The offending file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// Another process owns the store.
    #[error("store is locked by another process: {0}")]
    Locked(PathBuf),

    /// The store directory does not exist.
    #[error("store directory does not exist: {0}")]
    NotFound(PathBuf),

    /// A failure reported by a custom backend.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
