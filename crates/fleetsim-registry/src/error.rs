//! Registry error types

use thiserror::Error;

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Device already exists: {0}")]
    AlreadyExists(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Precondition failed for {device_id}: etag {expected} does not match {actual}")]
    PreconditionFailed {
        device_id: String,
        expected: String,
        actual: String,
    },
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
