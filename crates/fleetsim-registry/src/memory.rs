//! In-memory device registry
//!
//! Backed by a `DashMap`, so provisioning tasks can hit it concurrently.

use crate::error::{RegistryError, Result};
use crate::registry::{DeviceRegistry, RegistryEntry, SymmetricKey, Tags, ANY_ETAG};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Length of generated symmetric keys
const KEY_LENGTH: usize = 44;

/// In-memory device registry
pub struct MemoryRegistry {
    /// device id -> entry
    devices: DashMap<String, RegistryEntry>,
    /// Source of etag versions
    next_version: AtomicU64,
    /// Calls to `create` that registered a new device
    creates: AtomicU64,
    /// Calls to `get`
    gets: AtomicU64,
}

impl MemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
            next_version: AtomicU64::new(1),
            creates: AtomicU64::new(0),
            gets: AtomicU64::new(0),
        }
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Number of devices registered through `create`
    pub fn create_count(&self) -> u64 {
        self.creates.load(Ordering::Relaxed)
    }

    /// Number of `get` calls served
    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Snapshot of one entry, without counting as a `get`
    pub fn entry(&self, device_id: &str) -> Option<RegistryEntry> {
        self.devices.get(device_id).map(|r| r.value().clone())
    }

    /// Sorted ids of every registered device
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    fn next_etag(&self) -> String {
        self.next_version.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_LENGTH)
        .map(char::from)
        .collect()
}

#[async_trait]
impl DeviceRegistry for MemoryRegistry {
    async fn get(&self, device_id: &str) -> Result<Option<RegistryEntry>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        Ok(self.devices.get(device_id).map(|r| r.value().clone()))
    }

    async fn create(&self, device_id: &str) -> Result<RegistryEntry> {
        if device_id.is_empty() {
            return Err(RegistryError::Rejected("empty device id".to_string()));
        }

        match self.devices.entry(device_id.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyExists(device_id.to_string())),
            Entry::Vacant(vacant) => {
                let entry = RegistryEntry {
                    device_id: device_id.to_string(),
                    authentication: SymmetricKey {
                        primary: generate_key(),
                        secondary: generate_key(),
                    },
                    tags: Tags::new(),
                    etag: self.next_etag(),
                };
                vacant.insert(entry.clone());
                self.creates.fetch_add(1, Ordering::Relaxed);
                debug!(device_id, "Registered device");
                Ok(entry)
            }
        }
    }

    async fn update_tags(&self, device_id: &str, tags: &Tags, etag: &str) -> Result<()> {
        let mut entry = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| RegistryError::NotFound(device_id.to_string()))?;

        if etag != ANY_ETAG && etag != entry.etag {
            return Err(RegistryError::PreconditionFailed {
                device_id: device_id.to_string(),
                expected: etag.to_string(),
                actual: entry.etag.clone(),
            });
        }

        entry
            .tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        entry.etag = self.next_etag();
        Ok(())
    }

    async fn get_credential(&self, device_id: &str) -> Result<SymmetricKey> {
        self.devices
            .get(device_id)
            .map(|r| r.authentication.clone())
            .ok_or_else(|| RegistryError::NotFound(device_id.to_string()))
    }
}
