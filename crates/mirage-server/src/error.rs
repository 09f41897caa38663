//! Server error types.

use thiserror::Error;

/// Errors from the listener supervisor.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A listener could not bind or serve its port.
    #[error("failed to serve port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },

    /// A TLS listener's certificate or key could not be loaded.
    #[error("failed to load TLS material for port {port}: {source}")]
    TlsLoad {
        port: u16,
        source: std::io::Error,
    },

    /// A TLS listener's profile is missing or incomplete.
    #[error(transparent)]
    Config(#[from] mirage_core::ConfigError),

    /// A listener task panicked or was cancelled.
    #[error("listener task failed: {0}")]
    Runtime(String),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
