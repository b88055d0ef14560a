//! Hub and device connection strings.
//!
//! A hub connection string looks like
//! `HostName=hub.example.net;SharedAccessKeyName=iothubowner;SharedAccessKey=abc=`.
//! Each device gets its own descriptor derived from the hub host name and the
//! device's registry credential.

use crate::error::{CoreError, Result};
use std::fmt;
use std::str::FromStr;

/// Parsed hub (service-level) connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct HubConnectionString {
    host_name: String,
    shared_access_key_name: Option<String>,
    shared_access_key: Option<String>,
}

impl HubConnectionString {
    /// Parse a `Key=Value;Key=Value` connection string
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CoreError::InvalidConnectionString(
                "connection string is empty".to_string(),
            ));
        }

        let mut host_name = None;
        let mut shared_access_key_name = None;
        let mut shared_access_key = None;

        for segment in s.split(';').map(str::trim).filter(|seg| !seg.is_empty()) {
            // Values may contain '=' (base64 padding)
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                CoreError::InvalidConnectionString(format!("segment '{}' has no '='", segment))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CoreError::InvalidConnectionString(format!(
                    "segment '{}' has an empty key",
                    segment
                )));
            }

            match key.to_lowercase().as_str() {
                "hostname" => host_name = Some(value.trim().to_string()),
                "sharedaccesskeyname" => shared_access_key_name = Some(value.trim().to_string()),
                "sharedaccesskey" => shared_access_key = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let host_name = host_name.ok_or_else(|| {
            CoreError::InvalidConnectionString("missing HostName".to_string())
        })?;
        if host_name.is_empty() || host_name.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidConnectionString(format!(
                "invalid HostName '{}'",
                host_name
            )));
        }

        Ok(Self {
            host_name,
            shared_access_key_name,
            shared_access_key,
        })
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn shared_access_key_name(&self) -> Option<&str> {
        self.shared_access_key_name.as_deref()
    }

    pub fn shared_access_key(&self) -> Option<&str> {
        self.shared_access_key.as_deref()
    }

    /// Derives the connection descriptor for one device.
    pub fn device(&self, device_id: &str, key: &str) -> DeviceConnectionString {
        DeviceConnectionString {
            host_name: self.host_name.clone(),
            device_id: device_id.to_string(),
            shared_access_key: key.to_string(),
        }
    }
}

impl FromStr for HubConnectionString {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for HubConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubConnectionString")
            .field("host_name", &self.host_name)
            .field("shared_access_key_name", &self.shared_access_key_name)
            .field("shared_access_key", &self.shared_access_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Client-scoped connection descriptor for one device.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceConnectionString {
    host_name: String,
    device_id: String,
    shared_access_key: String,
}

impl DeviceConnectionString {
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn shared_access_key(&self) -> &str {
        &self.shared_access_key
    }
}

impl fmt::Display for DeviceConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HostName={};DeviceId={};SharedAccessKey={}",
            self.host_name, self.device_id, self.shared_access_key
        )
    }
}

impl fmt::Debug for DeviceConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConnectionString")
            .field("host_name", &self.host_name)
            .field("device_id", &self.device_id)
            .field("shared_access_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hub_connection_string() {
        let hub = HubConnectionString::parse(
            "HostName=hub.example.net;SharedAccessKeyName=iothubowner;SharedAccessKey=c2VjcmV0==",
        )
        .unwrap();
        assert_eq!(hub.host_name(), "hub.example.net");
        assert_eq!(hub.shared_access_key_name(), Some("iothubowner"));
        assert_eq!(hub.shared_access_key(), Some("c2VjcmV0=="));
    }

    #[test]
    fn test_parse_is_case_insensitive_and_tolerates_trailing_separator() {
        let hub = HubConnectionString::parse("hostname=hub.local;").unwrap();
        assert_eq!(hub.host_name(), "hub.local");
        assert_eq!(hub.shared_access_key(), None);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(HubConnectionString::parse("").is_err());
        assert!(HubConnectionString::parse("   ").is_err());
        assert!(HubConnectionString::parse("HostName").is_err());
        assert!(HubConnectionString::parse("=value").is_err());
        assert!(HubConnectionString::parse("SharedAccessKey=abc").is_err());
        assert!(HubConnectionString::parse("HostName=").is_err());
        assert!(HubConnectionString::parse("HostName=my hub").is_err());
    }

    #[test]
    fn test_device_connection_string() {
        let hub: HubConnectionString = "HostName=hub.local;SharedAccessKey=abc".parse().unwrap();
        let device = hub.device("SimulatedFridge-0001", "devkey=");
        assert_eq!(
            device.to_string(),
            "HostName=hub.local;DeviceId=SimulatedFridge-0001;SharedAccessKey=devkey="
        );
        assert!(!format!("{:?}", device).contains("devkey"));
        assert!(!format!("{:?}", hub).contains("abc"));
    }
}
