//! Message envelopes: a serialized payload plus routing and tracing metadata.

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::payload::TelemetryPayload;
use crate::types::DeviceIdentity;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Envelope property map.
pub type Properties = BTreeMap<String, String>;

/// `createdDateTime` format: UTC, second precision, e.g. `2024-05-01 12:00:00Z`.
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%SZ";

/// Mandatory property keys
pub mod keys {
    pub const MESSAGE_TYPE: &str = "messageType";
    pub const CORRELATION_ID: &str = "correlationId";
    pub const PARENT_CORRELATION_ID: &str = "parentCorrelationId";
    pub const CREATED_DATE_TIME: &str = "createdDateTime";
    pub const DEVICE_ID: &str = "deviceId";

    /// All mandatory keys, in the order they are documented.
    pub const ALL: [&str; 5] = [
        MESSAGE_TYPE,
        CORRELATION_ID,
        PARENT_CORRELATION_ID,
        CREATED_DATE_TIME,
        DEVICE_ID,
    ];
}

/// `messageType` value for telemetry.
pub const TELEMETRY_MESSAGE_TYPE: &str = "Telemetry";

/// An immutable telemetry message, built once per send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    body: Bytes,
    properties: Properties,
}

impl MessageEnvelope {
    /// UTF-8 encoded payload.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as text. Bodies built by [`EnvelopeBuilder`] are always valid UTF-8.
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or("")
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn device_id(&self) -> Option<&str> {
        self.property(keys::DEVICE_ID)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.property(keys::CORRELATION_ID)
    }

    pub fn created_date_time(&self) -> Option<&str> {
        self.property(keys::CREATED_DATE_TIME)
    }

    /// Size of the body in bytes
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Wraps payloads into envelopes.
#[derive(Clone)]
pub struct EnvelopeBuilder {
    clock: Arc<dyn Clock>,
    extra_properties: Properties,
}

impl Default for EnvelopeBuilder {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl EnvelopeBuilder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            extra_properties: Properties::new(),
        }
    }

    /// Builder method to set properties attached to every envelope.
    pub fn with_extra_properties(mut self, extra: Properties) -> Self {
        self.extra_properties = extra;
        self
    }

    /// Builds an envelope using the builder's extra properties.
    pub fn build(
        &self,
        payload: &TelemetryPayload,
        identity: &DeviceIdentity,
    ) -> Result<MessageEnvelope> {
        self.build_with(payload, identity, &Properties::new())
    }

    /// Builds an envelope, merging `extra` on top of the builder's extra
    /// properties. Mandatory keys are written last and cannot be overridden.
    pub fn build_with(
        &self,
        payload: &TelemetryPayload,
        identity: &DeviceIdentity,
        extra: &Properties,
    ) -> Result<MessageEnvelope> {
        let body = Bytes::from(payload.to_json()?);

        let mut properties = self.extra_properties.clone();
        properties.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        properties.insert(
            keys::MESSAGE_TYPE.to_string(),
            TELEMETRY_MESSAGE_TYPE.to_string(),
        );
        properties.insert(
            keys::CORRELATION_ID.to_string(),
            Uuid::new_v4().to_string(),
        );
        properties.insert(
            keys::PARENT_CORRELATION_ID.to_string(),
            Uuid::new_v4().to_string(),
        );
        properties.insert(
            keys::CREATED_DATE_TIME.to_string(),
            self.clock.now().format(CREATED_AT_FORMAT).to_string(),
        );
        properties.insert(keys::DEVICE_ID.to_string(), identity.id().to_string());

        Ok(MessageEnvelope { body, properties })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::BulbState;
    use crate::types::DeviceKind;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashSet;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn fixed_builder() -> EnvelopeBuilder {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        EnvelopeBuilder::new(Arc::new(FixedClock(at)))
    }

    #[test]
    fn test_mandatory_properties() {
        let identity = DeviceIdentity::new("SimulatedFridge-0007", DeviceKind::Fridge);
        let payload = TelemetryPayload::Fridge { temperature: 33 };
        let envelope = fixed_builder().build(&payload, &identity).unwrap();

        for key in keys::ALL {
            assert!(envelope.property(key).is_some(), "missing {}", key);
        }
        assert_eq!(envelope.property(keys::MESSAGE_TYPE), Some("Telemetry"));
        assert_eq!(envelope.device_id(), Some("SimulatedFridge-0007"));
        assert_eq!(envelope.created_date_time(), Some("2024-05-01 12:30:05Z"));
        assert_eq!(
            envelope.body_str(),
            r#"{"deviceType":"Fridge","temperature":33}"#
        );
        assert_eq!(envelope.properties().len(), 5);
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let builder = fixed_builder();
        let identity = DeviceIdentity::new("SimulatedLightBulbs-0001", DeviceKind::LightBulb);
        let payload = TelemetryPayload::LightBulb {
            state: BulbState::On,
        };

        let mut seen = HashSet::new();
        for _ in 0..1_000 {
            let envelope = builder.build(&payload, &identity).unwrap();
            let correlation = envelope.property(keys::CORRELATION_ID).unwrap().to_string();
            let parent = envelope
                .property(keys::PARENT_CORRELATION_ID)
                .unwrap()
                .to_string();
            assert!(seen.insert(correlation));
            assert!(seen.insert(parent));
        }
    }

    #[test]
    fn test_extra_properties_cannot_override_mandatory_keys() {
        let mut defaults = Properties::new();
        defaults.insert("site".to_string(), "lab-1".to_string());
        let builder = fixed_builder().with_extra_properties(defaults);

        let mut extra = Properties::new();
        extra.insert("deviceId".to_string(), "spoofed".to_string());
        extra.insert("batch".to_string(), "7".to_string());

        let identity = DeviceIdentity::new("SimulatedFridge-0001", DeviceKind::Fridge);
        let payload = TelemetryPayload::Fridge { temperature: 40 };
        let envelope = builder.build_with(&payload, &identity, &extra).unwrap();

        assert_eq!(envelope.device_id(), Some("SimulatedFridge-0001"));
        assert_eq!(envelope.property("site"), Some("lab-1"));
        assert_eq!(envelope.property("batch"), Some("7"));
        assert_eq!(envelope.properties().len(), 7);
    }
}
