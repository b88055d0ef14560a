//! Telemetry payload generation.
//!
//! Each device task owns its own [`PayloadGenerator`], so no random state is
//! shared between concurrently running devices.

use crate::error::Result;
use crate::types::{DeviceIdentity, DeviceKind};
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Fridge temperatures are drawn uniformly from this range.
pub const FRIDGE_TEMPERATURE_RANGE: RangeInclusive<i32> = 32..=51;

/// Light bulb state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulbState {
    On,
    Off,
}

impl BulbState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulbState::On => "on",
            BulbState::Off => "off",
        }
    }
}

impl fmt::Display for BulbState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single telemetry reading, tagged by `deviceType` when serialized.
///
/// ```json
/// {"deviceType":"Fridge","temperature":42}
/// {"deviceType":"LightBulb","state":"on"}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "deviceType")]
pub enum TelemetryPayload {
    Fridge { temperature: i32 },
    LightBulb { state: BulbState },
}

impl TelemetryPayload {
    /// Returns the kind of device that produces this payload.
    pub fn kind(&self) -> DeviceKind {
        match self {
            TelemetryPayload::Fridge { .. } => DeviceKind::Fridge,
            TelemetryPayload::LightBulb { .. } => DeviceKind::LightBulb,
        }
    }

    /// Serializes the payload to its JSON text form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Produces randomized payloads for one device.
pub struct PayloadGenerator {
    rng: StdRng,
}

impl PayloadGenerator {
    /// Creates a generator with a fixed seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates a generator seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates the generator for one device.
    ///
    /// With a run seed the device id is mixed in, so every device gets its own
    /// reproducible sequence independent of the order devices were provisioned.
    pub fn for_device(seed: Option<u64>, identity: &DeviceIdentity) -> Self {
        match seed {
            Some(seed) => Self::new(seed ^ fxhash::hash64(identity.id())),
            None => Self::from_entropy(),
        }
    }

    /// Draws a fresh payload for the device.
    pub fn generate(&mut self, identity: &DeviceIdentity) -> TelemetryPayload {
        self.generate_kind(identity.kind())
    }

    /// Draws a fresh payload for a device kind.
    pub fn generate_kind(&mut self, kind: DeviceKind) -> TelemetryPayload {
        match kind {
            DeviceKind::Fridge => TelemetryPayload::Fridge {
                temperature: self.rng.gen_range(FRIDGE_TEMPERATURE_RANGE),
            },
            DeviceKind::LightBulb => TelemetryPayload::LightBulb {
                state: if self.rng.gen_bool(0.5) {
                    BulbState::On
                } else {
                    BulbState::Off
                },
            },
        }
    }
}

impl fmt::Debug for PayloadGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadGenerator").finish_non_exhaustive()
    }
}
