//! Device identity types for the simulated fleet

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of device the simulator knows how to emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Reports an integer temperature reading
    Fridge,
    /// Reports an on/off state
    LightBulb,
}

impl DeviceKind {
    /// Returns the `deviceType` value carried in payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Fridge => "Fridge",
            DeviceKind::LightBulb => "LightBulb",
        }
    }

    /// Returns the registry name prefix used when none is configured.
    pub fn default_prefix(&self) -> &'static str {
        match self {
            DeviceKind::Fridge => "SimulatedFridge",
            DeviceKind::LightBulb => "SimulatedLightBulbs",
        }
    }

    /// Returns all device kinds.
    pub fn all() -> &'static [DeviceKind] {
        &[DeviceKind::Fridge, DeviceKind::LightBulb]
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fridge" => Ok(DeviceKind::Fridge),
            "lightbulb" | "light_bulb" | "light-bulb" => Ok(DeviceKind::LightBulb),
            _ => Err(CoreError::UnknownKind(s.to_string())),
        }
    }
}

/// A provisioned simulated device.
///
/// The kind is carried explicitly and never re-derived from the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    id: String,
    kind: DeviceKind,
}

impl DeviceIdentity {
    pub fn new(id: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Registry device id (e.g., "SimulatedFridge-0001")
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.kind)
    }
}

/// How many devices of one kind to provision, and how to name them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceKindSpec {
    /// Device kind, which selects the payload shape
    pub kind: DeviceKind,
    /// Name prefix; devices are named `{prefix}-{index:04}`
    pub prefix: String,
    /// Number of devices, indexed from 1 through `count`
    pub count: usize,
}

impl DeviceKindSpec {
    /// Creates a kind spec with the kind's default prefix.
    pub fn new(kind: DeviceKind, count: usize) -> Self {
        Self {
            kind,
            prefix: kind.default_prefix().to_string(),
            count,
        }
    }

    /// Builder method to set the name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Formats the deterministic, zero-padded device name for an index.
    pub fn device_name(&self, index: usize) -> String {
        format!("{}-{:04}", self.prefix, index)
    }

    /// Returns the identity for an index.
    pub fn identity(&self, index: usize) -> DeviceIdentity {
        DeviceIdentity::new(self.device_name(index), self.kind)
    }

    /// Returns the device indexes covered by this kind spec (1-based, inclusive).
    pub fn indexes(&self) -> std::ops::RangeInclusive<usize> {
        1..=self.count
    }

    /// Checks the name prefix
    pub fn validate(&self) -> Result<()> {
        if self.prefix.trim().is_empty() {
            return Err(CoreError::InvalidKindSpec(format!(
                "empty name prefix for {} devices",
                self.kind
            )));
        }
        if self.prefix.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(CoreError::InvalidKindSpec(format!(
                "prefix '{}' contains whitespace or '/'",
                self.prefix
            )));
        }
        Ok(())
    }
}
