//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error (permission denied, disk full, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A persisted record could not be parsed or failed validation
    #[error("invalid record at {path}: {message}")]
    InvalidRecord { path: String, message: String },

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Record already exists
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// Invalid key format
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    /// Create an invalid record error.
    pub fn invalid_record(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }
}
