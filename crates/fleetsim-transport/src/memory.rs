//! Transport that records envelopes in memory

use crate::error::{Result, TransportError};
use crate::transport::{Connection, Transport};
use async_trait::async_trait;
use fleetsim_core::{DeviceConnectionString, MessageEnvelope};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An envelope as received by [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct SentEnvelope {
    /// Device id from the connection descriptor that sent it
    pub connection_device_id: String,
    pub envelope: MessageEnvelope,
}

#[derive(Default)]
struct Shared {
    sent: Mutex<Vec<SentEnvelope>>,
    connects: AtomicU64,
}

/// Records every sent envelope. Clones share the same record.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// All envelopes sent so far, in arrival order
    pub fn sent(&self) -> Vec<SentEnvelope> {
        self.shared.sent.lock().clone()
    }

    /// Envelopes sent over one device's connection, in send order
    pub fn sent_by(&self, device_id: &str) -> Vec<MessageEnvelope> {
        self.shared
            .sent
            .lock()
            .iter()
            .filter(|s| s.connection_device_id == device_id)
            .map(|s| s.envelope.clone())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.shared.sent.lock().len()
    }

    /// Number of connections opened
    pub fn connect_count(&self) -> u64 {
        self.shared.connects.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, descriptor: &DeviceConnectionString) -> Result<Box<dyn Connection>> {
        if descriptor.shared_access_key().is_empty() {
            return Err(TransportError::Unauthorized(format!(
                "no key for {}",
                descriptor.device_id()
            )));
        }

        self.shared.connects.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryConnection {
            device_id: descriptor.device_id().to_string(),
            shared: Arc::clone(&self.shared),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    device_id: String,
    shared: Arc<Shared>,
    closed: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send(&mut self, envelope: &MessageEnvelope) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.shared.sent.lock().push(SentEnvelope {
            connection_device_id: self.device_id.clone(),
            envelope: envelope.clone(),
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsim_core::{
        BulbState, DeviceIdentity, DeviceKind, EnvelopeBuilder, HubConnectionString,
        TelemetryPayload,
    };

    #[tokio::test]
    async fn test_records_per_device() {
        let hub = HubConnectionString::parse("HostName=hub.local").unwrap();
        let transport = MemoryTransport::new();
        let builder = EnvelopeBuilder::default();

        let bulb = DeviceIdentity::new("SimulatedLightBulbs-0001", DeviceKind::LightBulb);
        let fridge = DeviceIdentity::new("SimulatedFridge-0001", DeviceKind::Fridge);

        let mut bulb_conn = transport.connect(&hub.device(bulb.id(), "k1")).await.unwrap();
        let mut fridge_conn = transport.connect(&hub.device(fridge.id(), "k2")).await.unwrap();

        let on = TelemetryPayload::LightBulb {
            state: BulbState::On,
        };
        bulb_conn.send(&builder.build(&on, &bulb).unwrap()).await.unwrap();
        bulb_conn.send(&builder.build(&on, &bulb).unwrap()).await.unwrap();
        fridge_conn
            .send(
                &builder
                    .build(&TelemetryPayload::Fridge { temperature: 40 }, &fridge)
                    .unwrap(),
            )
            .await
            .unwrap();

        // Clones observe the same record
        let observer = transport.clone();
        assert_eq!(observer.connect_count(), 2);
        assert_eq!(observer.sent_count(), 3);
        assert_eq!(observer.sent_by(bulb.id()).len(), 2);
        assert_eq!(observer.sent_by(fridge.id()).len(), 1);
    }
}
