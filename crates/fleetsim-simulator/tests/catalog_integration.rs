mod common;

use common::FlakyRegistry;
use fleetsim_core::{DeviceKind, DeviceKindSpec};
use fleetsim_registry::{DeviceRegistry, MemoryRegistry};
use fleetsim_simulator::catalog::{SIMULATED_TAG, SIMULATED_TAG_VALUE};
use fleetsim_simulator::{CatalogBuilder, SimulatorError};
use std::sync::Arc;

#[tokio::test]
async fn provisions_named_and_tagged_devices() {
    let registry = Arc::new(MemoryRegistry::new());
    let builder = CatalogBuilder::new(registry.clone(), 2);

    let catalog = builder
        .build(&DeviceKindSpec::new(DeviceKind::Fridge, 3))
        .await;

    assert!(catalog.is_complete());
    let mut ids: Vec<&str> = catalog.devices.iter().map(|d| d.id()).collect();
    ids.sort();
    assert_eq!(
        ids,
        vec!["SimulatedFridge-0001", "SimulatedFridge-0002", "SimulatedFridge-0003"]
    );

    for id in ids {
        let entry = registry.entry(id).unwrap();
        assert_eq!(entry.tag(SIMULATED_TAG), Some(SIMULATED_TAG_VALUE));
    }
}

#[tokio::test]
async fn second_build_reuses_existing_entries() {
    let registry = Arc::new(MemoryRegistry::new());
    let builder = CatalogBuilder::new(registry.clone(), 4);
    let spec = DeviceKindSpec::new(DeviceKind::LightBulb, 5);

    let first = builder.build(&spec).await;
    let key_before = registry
        .get_credential("SimulatedLightBulbs-0004")
        .await
        .unwrap();
    let second = builder.build(&spec).await;

    assert_eq!(first.len(), 5);
    assert_eq!(second.len(), 5);
    assert_eq!(registry.create_count(), 5);
    assert_eq!(registry.len(), 5);

    let key_after = registry
        .get_credential("SimulatedLightBulbs-0004")
        .await
        .unwrap();
    assert_eq!(key_before, key_after);
}

#[tokio::test]
async fn failed_registration_does_not_stop_the_batch() {
    let registry = Arc::new(FlakyRegistry::failing_create(&["SimulatedFridge-0002"]));
    let builder = CatalogBuilder::new(registry.clone(), 3);

    let catalog = builder
        .build(&DeviceKindSpec::new(DeviceKind::Fridge, 5))
        .await;

    assert!(!catalog.is_complete());
    assert_eq!(catalog.len(), 4);
    assert_eq!(catalog.failed_ids(), vec!["SimulatedFridge-0002".to_string()]);
    assert!(catalog
        .devices
        .iter()
        .all(|d| d.id() != "SimulatedFridge-0002"));
    assert_eq!(
        registry.inner.device_ids(),
        vec![
            "SimulatedFridge-0001",
            "SimulatedFridge-0003",
            "SimulatedFridge-0004",
            "SimulatedFridge-0005",
        ]
    );

    let err = catalog.ensure_complete().unwrap_err();
    assert_eq!(err.provisioned, 4);
    assert_eq!(err.failed, vec!["SimulatedFridge-0002".to_string()]);

    let err: SimulatorError = err.into();
    assert!(err.to_string().contains("SimulatedFridge-0002"));
}

#[tokio::test]
async fn custom_prefixes_and_kinds_are_kept_apart() {
    let registry = Arc::new(MemoryRegistry::new());
    let builder = CatalogBuilder::new(registry.clone(), 10);

    let catalog = builder
        .build_all(&[
            DeviceKindSpec::new(DeviceKind::Fridge, 2).with_prefix("LabFridge"),
            DeviceKindSpec::new(DeviceKind::LightBulb, 1),
        ])
        .await;

    assert_eq!(
        registry.device_ids(),
        vec!["LabFridge-0001", "LabFridge-0002", "SimulatedLightBulbs-0001"]
    );
    let bulb = catalog
        .devices
        .iter()
        .find(|d| d.id() == "SimulatedLightBulbs-0001")
        .unwrap();
    assert_eq!(bulb.kind(), DeviceKind::LightBulb);
}

#[tokio::test]
async fn panicking_registration_is_reported_and_the_rest_still_run() {
    let registry = Arc::new(FlakyRegistry::panicking_create(&["SimulatedFridge-0001"]));
    let builder = CatalogBuilder::new(registry.clone(), 1);

    let catalog = builder
        .build(&DeviceKindSpec::new(DeviceKind::Fridge, 4))
        .await;

    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.failed_ids(), vec!["SimulatedFridge-0001".to_string()]);
    assert!(matches!(
        catalog.failures[0].error,
        fleetsim_registry::RegistryError::Internal(_)
    ));
    assert_eq!(
        registry.inner.device_ids(),
        vec!["SimulatedFridge-0002", "SimulatedFridge-0003", "SimulatedFridge-0004"]
    );
}
