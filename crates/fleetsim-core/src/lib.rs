//! fleetsim Core - Core types for the simulated device fleet
//!
//! This crate provides the value types shared by every other fleetsim crate:
//! - `DeviceKind` / `DeviceIdentity`: what a simulated device is
//! - `DeviceKindSpec`: how many devices of a kind to provision, and their naming
//! - `TelemetryPayload` / `PayloadGenerator`: randomized per-kind readings
//! - `MessageEnvelope` / `EnvelopeBuilder`: a serialized payload plus tracing metadata
//! - `HubConnectionString` / `DeviceConnectionString`: endpoint and per-device credentials
//! - `Clock`: the time source used for envelope timestamps

pub mod clock;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use connection::{DeviceConnectionString, HubConnectionString};
pub use envelope::{EnvelopeBuilder, MessageEnvelope, Properties, CREATED_AT_FORMAT};
pub use error::{CoreError, Result};
pub use payload::{BulbState, PayloadGenerator, TelemetryPayload};
pub use types::{DeviceIdentity, DeviceKind, DeviceKindSpec};
