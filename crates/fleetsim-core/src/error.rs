//! Error types for fleetsim-core

use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Invalid device kind spec: {0}")]
    InvalidKindSpec(String),

    #[error("Unknown device kind: {0}")]
    UnknownKind(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}
