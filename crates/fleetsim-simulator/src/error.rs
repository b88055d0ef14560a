//! Error types for the fleet simulator

use crate::catalog::{CatalogError, ProvisionFailure};
use fleetsim_core::CoreError;
use fleetsim_registry::RegistryError;
use fleetsim_transport::TransportError;
use thiserror::Error;

/// Simulator errors
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// The registry was unreachable or rejected a provisioning request
    #[error("Registration of {device_id} failed: {source}")]
    Registration {
        device_id: String,
        #[source]
        source: RegistryError,
    },

    /// The device could not fetch its credential or open its connection
    #[error("Connection of {device_id} failed: {reason}")]
    Connection { device_id: String, reason: String },

    /// A single telemetry send failed; the device keeps running
    #[error("Send from {device_id} failed: {source}")]
    Send {
        device_id: String,
        #[source]
        source: TransportError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("No devices were provisioned (failed: {})", .failed.join(", "))]
    EmptyFleet { failed: Vec<String> },

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SimulatorError {
    /// Device the error belongs to, if any
    pub fn device_id(&self) -> Option<&str> {
        match self {
            SimulatorError::Registration { device_id, .. }
            | SimulatorError::Connection { device_id, .. }
            | SimulatorError::Send { device_id, .. } => Some(device_id),
            _ => None,
        }
    }
}

impl From<ProvisionFailure> for SimulatorError {
    fn from(failure: ProvisionFailure) -> Self {
        SimulatorError::Registration {
            device_id: failure.device_id,
            source: failure.error,
        }
    }
}

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, SimulatorError>;
