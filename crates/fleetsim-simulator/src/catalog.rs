//! Device catalog: provisioning simulated devices with the registry.
//!
//! For every index of a [`DeviceKindSpec`] the builder fetches the registry
//! entry (creating it when absent), tags it as simulated, and adds the device
//! to the catalog. Provisioning is fail-soft: a device that cannot be
//! registered is recorded as a failure and the rest of the batch carries on.

use crate::parallel::for_each_bounded;
use fleetsim_core::{DeviceIdentity, DeviceKind, DeviceKindSpec};
use fleetsim_registry::{DeviceRegistry, RegistryEntry, RegistryError, Tags, ANY_ETAG};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Tag attached to every provisioned device
pub const SIMULATED_TAG: &str = "IsSimulated";
pub const SIMULATED_TAG_VALUE: &str = "Y";

/// Default provisioning concurrency
pub const DEFAULT_PROVISION_CONCURRENCY: usize = 10;

/// A device that could not be provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionFailure {
    pub device_id: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: RegistryError,
}

fn serialize_display<S: serde::Serializer>(
    error: &RegistryError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Provisioning was only partially successful.
#[derive(Debug, Error)]
#[error("{} device(s) failed to provision ({} provisioned): {}", .failed.len(), .provisioned, .failed.join(", "))]
pub struct CatalogError {
    pub provisioned: usize,
    pub failed: Vec<String>,
}

/// The provisioned fleet, plus the devices that did not make it.
///
/// Device order is completion order and carries no meaning.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub devices: Vec<DeviceIdentity>,
    pub failures: Vec<ProvisionFailure>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// True when every requested device was provisioned
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of provisioned devices per kind
    pub fn count_by_kind(&self) -> BTreeMap<DeviceKind, usize> {
        let mut counts = BTreeMap::new();
        for device in &self.devices {
            *counts.entry(device.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Sorted ids of the devices that failed to provision
    pub fn failed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.failures.iter().map(|f| f.device_id.clone()).collect();
        ids.sort();
        ids
    }

    /// Appends another catalog's devices and failures.
    pub fn merge(&mut self, other: Catalog) {
        self.devices.extend(other.devices);
        self.failures.extend(other.failures);
    }

    /// Fail-fast view: the devices if provisioning was complete, else an error.
    pub fn ensure_complete(self) -> std::result::Result<Vec<DeviceIdentity>, CatalogError> {
        if self.is_complete() {
            Ok(self.devices)
        } else {
            Err(CatalogError {
                provisioned: self.devices.len(),
                failed: self.failed_ids(),
            })
        }
    }
}

/// Provisions devices with bounded concurrency.
#[derive(Clone)]
pub struct CatalogBuilder {
    registry: Arc<dyn DeviceRegistry>,
    concurrency: usize,
    tags: Tags,
}

impl CatalogBuilder {
    pub fn new(registry: Arc<dyn DeviceRegistry>, concurrency: usize) -> Self {
        let mut tags = Tags::new();
        tags.insert(SIMULATED_TAG.to_string(), SIMULATED_TAG_VALUE.to_string());

        Self {
            registry,
            concurrency,
            tags,
        }
    }

    /// Provisions every kind in turn, one batch per kind.
    pub async fn build_all(&self, specs: &[DeviceKindSpec]) -> Catalog {
        let mut catalog = Catalog::default();
        for spec in specs {
            catalog.merge(self.build(spec).await);
        }
        catalog
    }

    /// Provisions the devices of one kind.
    pub async fn build(&self, spec: &DeviceKindSpec) -> Catalog {
        info!(
            "Provisioning {} {} device(s) with prefix {} (concurrency {})",
            spec.count, spec.kind, spec.prefix, self.concurrency
        );

        let devices = Arc::new(Mutex::new(Vec::with_capacity(spec.count)));
        let identities: Vec<DeviceIdentity> = spec.indexes().map(|i| spec.identity(i)).collect();

        let registry = Arc::clone(&self.registry);
        let tags = Arc::new(self.tags.clone());
        let collected = Arc::clone(&devices);

        let result = for_each_bounded(identities, self.concurrency, move |identity| {
            let registry = Arc::clone(&registry);
            let tags = Arc::clone(&tags);
            let collected = Arc::clone(&collected);
            async move {
                provision_device(registry.as_ref(), &identity, &tags).await?;
                collected.lock().push(identity);
                Ok::<(), ProvisionFailure>(())
            }
        })
        .await;

        let failures = match result {
            Ok(()) => Vec::new(),
            Err(batch) => {
                let mut failures = batch.errors;
                failures.extend(batch.panicked.into_iter().map(|identity| ProvisionFailure {
                    device_id: identity.id().to_string(),
                    error: RegistryError::Internal("provisioning task panicked".to_string()),
                }));
                for failure in &failures {
                    warn!(
                        device_id = %failure.device_id,
                        "Provisioning failed: {}", failure.error
                    );
                }
                failures
            }
        };

        let devices = std::mem::take(&mut *devices.lock());
        info!(
            "Provisioned {} of {} {} device(s)",
            devices.len(),
            spec.count,
            spec.kind
        );

        Catalog { devices, failures }
    }
}

/// Fetch-or-create one device and tag it as simulated.
pub async fn provision_device(
    registry: &dyn DeviceRegistry,
    identity: &DeviceIdentity,
    tags: &Tags,
) -> std::result::Result<RegistryEntry, ProvisionFailure> {
    let device_id = identity.id();
    let fail = |error: RegistryError| ProvisionFailure {
        device_id: device_id.to_string(),
        error,
    };

    info!("Registering device ({})", device_id);

    let entry = match registry.get(device_id).await.map_err(fail)? {
        Some(entry) => entry,
        None => match registry.create(device_id).await {
            Ok(entry) => entry,
            // Created by someone else between get and create
            Err(RegistryError::AlreadyExists(_)) => registry
                .get(device_id)
                .await
                .map_err(fail)?
                .ok_or_else(|| fail(RegistryError::NotFound(device_id.to_string())))?,
            Err(e) => return Err(fail(e)),
        },
    };

    registry
        .update_tags(&entry.device_id, tags, ANY_ETAG)
        .await
        .map_err(fail)?;

    Ok(entry)
}
