//! Transport boundary traits

use crate::error::Result;
use async_trait::async_trait;
use fleetsim_core::{DeviceConnectionString, MessageEnvelope};

/// Opens device connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Authenticate as the device and open its connection.
    async fn connect(&self, descriptor: &DeviceConnectionString) -> Result<Box<dyn Connection>>;
}

/// One device's exclusive connection.
#[async_trait]
pub trait Connection: Send {
    /// Hand an envelope to the transport. No delivery acknowledgment is awaited.
    async fn send(&mut self, envelope: &MessageEnvelope) -> Result<()>;

    /// Close the connection. Sends after close fail with `Closed`.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
