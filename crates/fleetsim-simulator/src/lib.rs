//! Simulated IoT device fleet.
//!
//! Provisions a catalog of simulated fridges and light bulbs in a device
//! registry, then drives one telemetry loop per device, each sending a
//! randomized reading through a transport at a fixed interval.
//!
//! # Usage
//! ```bash
//! # Write a default fleetsim.yml
//! fleetsim generate-config
//!
//! # Provision the catalog only
//! fleetsim provision
//!
//! # Provision, then send telemetry until Ctrl-C
//! fleetsim run --interval-ms 1000
//! ```

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod parallel;
pub mod report;
pub mod simulation;
pub mod stats;

pub use catalog::{provision_device, Catalog, CatalogBuilder, CatalogError, ProvisionFailure};
pub use config::Config;
pub use dispatch::{DeviceLoop, DeviceOutcome, DeviceState, DispatchSettings, FleetDispatcher, FleetOutcome};
pub use error::{Result, SimulatorError};
pub use parallel::{for_each_bounded, BatchFailure};
pub use report::{FleetReport, RunMode};
pub use simulation::Simulation;
