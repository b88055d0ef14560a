//! Simulator configuration, loadable from YAML (`fleetsim.yml`).

use crate::catalog::DEFAULT_PROVISION_CONCURRENCY;
use crate::dispatch::{DispatchSettings, DEFAULT_DISPATCH_CONCURRENCY};
use crate::error::{Result, SimulatorError};
use fleetsim_core::{DeviceKind, DeviceKindSpec, HubConnectionString, Properties};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{warn, Level};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "fleetsim.yml";

/// Devices per kind when none are configured
pub const DEFAULT_DEVICES_PER_KIND: usize = 50;

/// Complete simulator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hub endpoint
    pub hub: HubSettings,
    /// Fleet composition and provisioning
    pub fleet: FleetSettings,
    /// Telemetry dispatch
    pub dispatch: DispatchConfig,
    /// Log transport output
    pub transport: TransportSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Hub endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// `HostName=...;SharedAccessKeyName=...;SharedAccessKey=...`
    pub connection_string: String,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            connection_string:
                "HostName=localhost;SharedAccessKeyName=iothubowner;SharedAccessKey=c2ltdWxhdG9y"
                    .to_string(),
        }
    }
}

/// Fleet composition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    /// Device kinds to provision, in order
    pub device_kinds: Vec<DeviceKindSpec>,
    /// Maximum concurrent registry operations
    pub provision_concurrency: usize,
    /// Maximum concurrently running device loops
    pub dispatch_concurrency: usize,
    /// Abort the run when any device fails to provision
    pub fail_on_partial_catalog: bool,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            device_kinds: DeviceKind::all()
                .iter()
                .map(|kind| DeviceKindSpec::new(*kind, DEFAULT_DEVICES_PER_KIND))
                .collect(),
            provision_concurrency: DEFAULT_PROVISION_CONCURRENCY,
            dispatch_concurrency: DEFAULT_DISPATCH_CONCURRENCY,
            fail_on_partial_catalog: false,
        }
    }
}

impl FleetSettings {
    /// Total number of devices requested
    pub fn device_count(&self) -> usize {
        self.device_kinds.iter().map(|k| k.count).sum()
    }
}

/// Telemetry dispatch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Pause between sends of one device, in milliseconds
    pub interval_ms: u64,
    /// Stop each device after this many sends (unset = run until stopped)
    pub max_messages: Option<u64>,
    /// Stop the whole fleet after this many seconds (unset = run until stopped)
    pub duration_secs: Option<u64>,
    /// Extra connect attempts per device (0 = give up on the first failure)
    pub connect_retries: u32,
    /// Backoff base for connect retries, in milliseconds
    pub retry_delay_ms: u64,
    /// Seed for reproducible payloads
    pub seed: Option<u64>,
    /// Properties attached to every message
    pub extra_properties: Properties,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_messages: None,
            duration_secs: None,
            connect_retries: 0,
            retry_delay_ms: 500,
            seed: None,
            extra_properties: Properties::new(),
        }
    }
}

/// Log transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Include message bodies in send log lines
    pub log_bodies: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self { log_bodies: true }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Include target in logs
    pub show_target: bool,
    /// Include thread IDs in logs
    pub show_thread_ids: bool,
    /// Include file and line numbers
    pub show_location: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_target: false,
            show_thread_ids: false,
            show_location: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Write default config to a file (for generating example config)
    pub fn write_default(path: impl AsRef<Path>) -> Result<()> {
        let yaml = serde_yaml::to_string(&Self::default())?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.hub_connection_string()?;

        if self.fleet.provision_concurrency == 0 {
            return Err(SimulatorError::Config(
                "fleet.provision_concurrency must be at least 1".to_string(),
            ));
        }
        if self.fleet.dispatch_concurrency == 0 {
            return Err(SimulatorError::Config(
                "fleet.dispatch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.dispatch.interval_ms == 0 {
            return Err(SimulatorError::Config(
                "dispatch.interval_ms must be at least 1".to_string(),
            ));
        }
        if self.has_sub_second_interval() {
            warn!(
                "dispatch.interval_ms is {}; createdDateTime has one-second precision, \
                 so sends within the same second share a timestamp",
                self.dispatch.interval_ms
            );
        }
        if self.dispatch.max_messages == Some(0) {
            return Err(SimulatorError::Config(
                "dispatch.max_messages must be at least 1 when set".to_string(),
            ));
        }

        let mut prefixes = HashSet::new();
        for spec in &self.fleet.device_kinds {
            spec.validate()?;
            if !prefixes.insert(spec.prefix.as_str()) {
                return Err(SimulatorError::Config(format!(
                    "duplicate device prefix '{}'",
                    spec.prefix
                )));
            }
        }

        Ok(())
    }

    /// True when devices send more than once per `createdDateTime` tick
    pub fn has_sub_second_interval(&self) -> bool {
        self.dispatch.interval_ms < 1000
    }

    /// Parse the hub connection string
    pub fn hub_connection_string(&self) -> Result<HubConnectionString> {
        HubConnectionString::parse(&self.hub.connection_string)
            .map_err(|e| SimulatorError::Config(e.to_string()))
    }

    /// Convert to DispatchSettings
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            interval: Duration::from_millis(self.dispatch.interval_ms),
            max_messages: self.dispatch.max_messages,
            connect_retries: self.dispatch.connect_retries,
            retry_delay: Duration::from_millis(self.dispatch.retry_delay_ms),
            seed: self.dispatch.seed,
            extra_properties: self.dispatch.extra_properties.clone(),
        }
    }

    /// Fleet run time limit, if any
    pub fn duration(&self) -> Option<Duration> {
        self.dispatch.duration_secs.map(Duration::from_secs)
    }

    /// Get log level
    pub fn log_level(&self) -> Level {
        match self.logging.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fleet.device_count(), 100);
        assert_eq!(config.fleet.provision_concurrency, 10);
        assert_eq!(config.fleet.dispatch_concurrency, 100);
        assert_eq!(config.dispatch_settings().interval, Duration::from_secs(1));
        assert_eq!(config.dispatch_settings().connect_retries, 0);
        assert_eq!(config.duration(), None);
        assert_eq!(config.log_level(), Level::INFO);

        let prefixes: Vec<&str> = config
            .fleet
            .device_kinds
            .iter()
            .map(|k| k.prefix.as_str())
            .collect();
        assert_eq!(prefixes, vec!["SimulatedFridge", "SimulatedLightBulbs"]);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
hub:
  connection_string: "HostName=hub.example.net;SharedAccessKeyName=owner;SharedAccessKey=abc="
fleet:
  device_kinds:
    - kind: Fridge
      prefix: LabFridge
      count: 3
dispatch:
  interval_ms: 250
  extra_properties:
    site: lab-1
logging:
  level: debug
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.fleet.device_count(), 3);
        assert_eq!(config.fleet.provision_concurrency, 10);
        assert_eq!(config.dispatch.interval_ms, 250);
        assert_eq!(config.dispatch.retry_delay_ms, 500);
        assert_eq!(
            config.dispatch_settings().extra_properties.get("site"),
            Some(&"lab-1".to_string())
        );
        assert_eq!(config.hub_connection_string().unwrap().host_name(), "hub.example.net");
        assert_eq!(config.log_level(), Level::DEBUG);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.hub.connection_string = "SharedAccessKey=abc".to_string();
        assert!(matches!(config.validate(), Err(SimulatorError::Config(_))));

        let mut config = Config::default();
        config.fleet.dispatch_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.dispatch.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.dispatch.max_messages = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fleet.device_kinds = vec![
            DeviceKindSpec::new(DeviceKind::Fridge, 1).with_prefix("Dup"),
            DeviceKindSpec::new(DeviceKind::LightBulb, 1).with_prefix("Dup"),
        ];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fleet.device_kinds = vec![DeviceKindSpec::new(DeviceKind::Fridge, 1).with_prefix("")];
        assert!(matches!(config.validate(), Err(SimulatorError::Core(_))));
    }

    #[test]
    fn test_sub_second_interval_is_allowed() {
        let mut config = Config::default();
        assert!(!config.has_sub_second_interval());

        config.dispatch.interval_ms = 250;
        assert!(config.has_sub_second_interval());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let yaml = r#"
fleet:
  device_kinds:
    - kind: Toaster
      prefix: T
      count: 1
"#;
        assert!(matches!(Config::from_yaml(yaml), Err(SimulatorError::Yaml(_))));
    }
}
