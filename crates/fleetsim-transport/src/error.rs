//! Transport error types

use thiserror::Error;

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Connection closed")]
    Closed,
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
