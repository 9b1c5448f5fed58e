//! The [`Message`] value type carried from ingress through the dispatcher to brokers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single telemetry message accepted from an ingress adapter.
///
/// Immutable once constructed: the dispatcher and workers only ever read
/// a `Message`, they never mutate one in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Opaque identifier, unique per process run.
    pub id: String,
    /// Identifier of the device that produced this message.
    pub device_id: String,
    /// Time the message was accepted by ingress.
    pub timestamp: DateTime<Utc>,
    /// Broker-layer routing key.
    pub topic: String,
    /// Opaque payload bytes.
    #[serde(with = "payload_encoding")]
    pub payload: Vec<u8>,
    /// Broker names this message should be published to.
    ///
    /// May contain duplicates (each duplicate causes an additional publish)
    /// and may be empty (the message is then silently dropped).
    pub target_brokers: Vec<String>,
    /// Name of the broker this message arrived from, if it was relayed
    /// rather than ingress-originated. Empty string for ingress-originated
    /// messages.
    #[serde(default)]
    pub source_broker: String,
}

impl Message {
    /// Build a new ingress-originated message, assigning `id` and `timestamp`.
    #[must_use]
    pub fn new(device_id: impl Into<String>, topic: impl Into<String>, payload: Vec<u8>, target_brokers: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            device_id: device_id.into(),
            timestamp: Utc::now(),
            topic: topic.into(),
            payload,
            target_brokers,
            source_broker: String::new(),
        }
    }
}

/// Accepts a payload either as a base64 string or as a raw JSON array of
/// byte values; always serializes back out as base64. Shared with the
/// ingress adapter, whose wire contract documents both encodings.
pub(crate) mod payload_encoding {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Base64(String),
        Raw(Vec<u8>),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Base64(s) => base64::engine::general_purpose::STANDARD
                .decode(s.as_bytes())
                .map_err(serde::de::Error::custom),
            Repr::Raw(bytes) => Ok(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_assigns_id_and_timestamp() {
        let m = Message::new("device-1", "sensors/temp", vec![1, 2, 3], vec!["b1".to_string()]);
        assert!(!m.id.is_empty());
        assert_eq!(m.device_id, "device-1");
        assert_eq!(m.topic, "sensors/temp");
        assert_eq!(m.source_broker, "");
    }

    #[test]
    fn duplicate_target_brokers_are_preserved() {
        let m = Message::new("d1", "t", vec![], vec!["b1".to_string(), "b1".to_string()]);
        assert_eq!(m.target_brokers, vec!["b1", "b1"]);
    }

    #[test]
    fn empty_target_brokers_is_valid() {
        let m = Message::new("d1", "t", vec![], vec![]);
        assert!(m.target_brokers.is_empty());
    }

    #[test]
    fn payload_round_trips_through_json() {
        let m = Message::new("d1", "t", vec![0xde, 0xad, 0xbe, 0xef], vec!["b1".to_string()]);
        let json = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.payload, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn payload_accepts_raw_json_array_alongside_base64() {
        let json = r#"{
            "id": "x", "device_id": "d1", "timestamp": "2024-01-01T00:00:00Z",
            "topic": "t", "payload": [1, 2, 3], "target_brokers": [], "source_broker": ""
        }"#;
        let m: Message = serde_json::from_str(json).unwrap();
        assert_eq!(m.payload, vec![1, 2, 3]);
    }
}
