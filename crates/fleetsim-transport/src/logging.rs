//! Transport that writes each envelope to the log

use crate::error::{Result, TransportError};
use crate::transport::{Connection, Transport};
use async_trait::async_trait;
use fleetsim_core::{DeviceConnectionString, MessageEnvelope};
use tracing::{debug, info};

/// Logs every envelope at info level instead of delivering it.
#[derive(Debug, Clone)]
pub struct LogTransport {
    log_bodies: bool,
}

impl LogTransport {
    pub fn new() -> Self {
        Self { log_bodies: true }
    }

    /// Builder method to include or omit message bodies in log lines.
    pub fn with_bodies(mut self, log_bodies: bool) -> Self {
        self.log_bodies = log_bodies;
        self
    }
}

impl Default for LogTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn connect(&self, descriptor: &DeviceConnectionString) -> Result<Box<dyn Connection>> {
        if descriptor.shared_access_key().is_empty() {
            return Err(TransportError::Unauthorized(format!(
                "no key for {}",
                descriptor.device_id()
            )));
        }

        debug!(
            host = descriptor.host_name(),
            device_id = descriptor.device_id(),
            "Opened log connection"
        );

        Ok(Box::new(LogConnection {
            device_id: descriptor.device_id().to_string(),
            log_bodies: self.log_bodies,
            closed: false,
        }))
    }
}

struct LogConnection {
    device_id: String,
    log_bodies: bool,
    closed: bool,
}

#[async_trait]
impl Connection for LogConnection {
    async fn send(&mut self, envelope: &MessageEnvelope) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let correlation_id = envelope.correlation_id().unwrap_or_default();
        if self.log_bodies {
            info!(
                correlation_id,
                "Sending data ({}): {}",
                self.device_id,
                envelope.body_str()
            );
        } else {
            info!(
                correlation_id,
                bytes = envelope.len(),
                "Sending data ({})",
                self.device_id
            );
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        debug!(device_id = %self.device_id, "Closed log connection");
        Ok(())
    }
}
