//! Storage error types.

use thiserror::Error;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from rusqlite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error (e.g., creating the cache file's parent directory).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("storage configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
