//! Registry boundary trait and entry types

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Device tags (e.g., `IsSimulated=Y`)
pub type Tags = BTreeMap<String, String>;

/// Etag that matches any entry version (unconditional write).
pub const ANY_ETAG: &str = "*";

/// Symmetric key pair issued by the registry for device authentication.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymmetricKey {
    pub primary: String,
    pub secondary: String,
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// A registered device as the registry sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub device_id: String,
    pub authentication: SymmetricKey,
    pub tags: Tags,
    /// Opaque version token, changes on every update
    pub etag: String,
}

impl RegistryEntry {
    /// Returns a tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// The external device registry.
///
/// Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Fetch an entry; `Ok(None)` when the device is not registered.
    async fn get(&self, device_id: &str) -> Result<Option<RegistryEntry>>;

    /// Register a new device. Fails with `AlreadyExists` if it is registered.
    async fn create(&self, device_id: &str) -> Result<RegistryEntry>;

    /// Merge `tags` into the entry's tags (last write wins per key).
    /// `etag` must match the entry's current etag unless it is [`ANY_ETAG`].
    async fn update_tags(&self, device_id: &str, tags: &Tags, etag: &str) -> Result<()>;

    /// Read the device's authentication credential.
    async fn get_credential(&self, device_id: &str) -> Result<SymmetricKey>;
}
