#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fleetsim_core::{Clock, DeviceConnectionString, MessageEnvelope};
use fleetsim_registry::{
    DeviceRegistry, MemoryRegistry, RegistryEntry, RegistryError, SymmetricKey, Tags,
};
use fleetsim_transport::{Connection, MemoryTransport, Transport, TransportError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Instant;

pub const HUB: &str = "HostName=hub.test.local;SharedAccessKeyName=iothubowner;SharedAccessKey=dGVzdA==";

/// Wall clock that follows tokio time, so paused tests get stable timestamps.
pub struct TokioClock {
    base: DateTime<Utc>,
    start: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            base: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            start: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::milliseconds(self.start.elapsed().as_millis() as i64)
    }
}

/// Registry whose `create` fails or panics for chosen devices.
pub struct FlakyRegistry {
    pub inner: MemoryRegistry,
    fail_create: HashSet<String>,
    panic_create: HashSet<String>,
}

impl FlakyRegistry {
    pub fn failing_create(ids: &[&str]) -> Self {
        Self {
            inner: MemoryRegistry::new(),
            fail_create: ids.iter().map(|s| s.to_string()).collect(),
            panic_create: HashSet::new(),
        }
    }

    pub fn panicking_create(ids: &[&str]) -> Self {
        Self {
            inner: MemoryRegistry::new(),
            fail_create: HashSet::new(),
            panic_create: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl DeviceRegistry for FlakyRegistry {
    async fn get(&self, device_id: &str) -> fleetsim_registry::Result<Option<RegistryEntry>> {
        self.inner.get(device_id).await
    }

    async fn create(&self, device_id: &str) -> fleetsim_registry::Result<RegistryEntry> {
        if self.panic_create.contains(device_id) {
            panic!("registry client crashed on {}", device_id);
        }
        if self.fail_create.contains(device_id) {
            return Err(RegistryError::Unavailable(format!(
                "injected failure for {}",
                device_id
            )));
        }
        self.inner.create(device_id).await
    }

    async fn update_tags(
        &self,
        device_id: &str,
        tags: &Tags,
        etag: &str,
    ) -> fleetsim_registry::Result<()> {
        self.inner.update_tags(device_id, tags, etag).await
    }

    async fn get_credential(&self, device_id: &str) -> fleetsim_registry::Result<SymmetricKey> {
        self.inner.get_credential(device_id).await
    }
}

/// Transport that refuses or delays connections and can drop every other send.
#[derive(Clone)]
pub struct FlakyTransport {
    pub inner: MemoryTransport,
    refuse: Arc<HashSet<String>>,
    panic_on_connect: Arc<HashSet<String>>,
    connect_failures: Arc<Mutex<HashMap<String, u32>>>,
    fail_every_other_send: bool,
}

impl FlakyTransport {
    pub fn new() -> Self {
        Self {
            inner: MemoryTransport::new(),
            refuse: Arc::new(HashSet::new()),
            panic_on_connect: Arc::new(HashSet::new()),
            connect_failures: Arc::new(Mutex::new(HashMap::new())),
            fail_every_other_send: false,
        }
    }

    /// Never connect these devices.
    pub fn refusing(mut self, ids: &[&str]) -> Self {
        self.refuse = Arc::new(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Panic while connecting these devices.
    pub fn panicking_on_connect(mut self, ids: &[&str]) -> Self {
        self.panic_on_connect = Arc::new(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Fail the first `count` connect attempts of a device.
    pub fn failing_first_connects(self, id: &str, count: u32) -> Self {
        self.connect_failures.lock().insert(id.to_string(), count);
        self
    }

    /// Fail the 2nd, 4th, 6th... send of every connection.
    pub fn failing_every_other_send(mut self) -> Self {
        self.fail_every_other_send = true;
        self
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn connect(
        &self,
        descriptor: &DeviceConnectionString,
    ) -> fleetsim_transport::Result<Box<dyn Connection>> {
        let device_id = descriptor.device_id();
        if self.panic_on_connect.contains(device_id) {
            panic!("transport crashed on {}", device_id);
        }
        if self.refuse.contains(device_id) {
            return Err(TransportError::Connect(format!("{} refused", device_id)));
        }
        let busy = {
            let mut failures = self.connect_failures.lock();
            match failures.get_mut(device_id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if busy {
            return Err(TransportError::Connect("hub busy".to_string()));
        }

        let inner = self.inner.connect(descriptor).await?;
        Ok(Box::new(FlakyConnection {
            inner,
            sends: 0,
            fail_every_other_send: self.fail_every_other_send,
        }))
    }
}

struct FlakyConnection {
    inner: Box<dyn Connection>,
    sends: u64,
    fail_every_other_send: bool,
}

#[async_trait]
impl Connection for FlakyConnection {
    async fn send(&mut self, envelope: &MessageEnvelope) -> fleetsim_transport::Result<()> {
        self.sends += 1;
        if self.fail_every_other_send && self.sends % 2 == 0 {
            return Err(TransportError::Send("dropped".to_string()));
        }
        self.inner.send(envelope).await
    }

    async fn close(&mut self) -> fleetsim_transport::Result<()> {
        self.inner.close().await
    }
}
