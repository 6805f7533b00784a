//! Message types crossing the resilience layer.
//!
//! Inbound messages carry the raw bytes plus Kafka metadata. Outbound
//! messages accept bytes, text or a structured value and are normalized
//! to a byte payload with a populated timestamp before handoff to the
//! underlying producer.

use crate::error::Result;
use serde::Serialize;

/// A message pulled from a Kafka topic.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Kafka topic name
    pub topic: String,
    /// Kafka partition number
    pub partition: i32,
    /// Kafka offset within the partition
    pub offset: i64,
    /// Raw message payload (if any)
    pub payload: Option<Vec<u8>>,
    /// Message key (if any)
    pub key: Option<Vec<u8>>,
    /// Message timestamp in milliseconds since epoch (if available)
    pub timestamp: Option<i64>,
}

/// Outbound payload variants accepted by [`OutboundMessage`].
#[derive(Debug, Clone)]
pub enum OutboundPayload {
    /// Raw bytes, passed through unchanged
    Bytes(Vec<u8>),
    /// Text, converted to UTF-8 bytes
    Text(String),
    /// Structured value, serialized to JSON text and then to bytes
    Json(serde_json::Value),
}

/// A message to publish, before normalization.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Topic to publish to
    pub topic: String,
    /// Target partition; `None` lets the broker choose
    pub partition: Option<i32>,
    /// Message payload
    pub payload: OutboundPayload,
    /// Message key (if any)
    pub key: Option<Vec<u8>>,
    /// Timestamp in milliseconds since epoch; defaults to now when unset
    pub timestamp: Option<i64>,
}

impl OutboundMessage {
    /// Message with a raw byte payload.
    pub fn bytes(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            payload: OutboundPayload::Bytes(payload.into()),
            key: None,
            timestamp: None,
        }
    }

    /// Message with a text payload.
    pub fn text(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            payload: OutboundPayload::Text(payload.into()),
            key: None,
            timestamp: None,
        }
    }

    /// Message with a structured payload, serialized to JSON on publish.
    pub fn json<T: Serialize>(topic: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self {
            topic: topic.into(),
            partition: None,
            payload: OutboundPayload::Json(serde_json::to_value(value)?),
            key: None,
            timestamp: None,
        })
    }

    /// Set the message key.
    pub fn key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the target partition.
    pub fn partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Set the message timestamp (milliseconds since epoch).
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Normalize into a record ready for the producer: payload becomes a
    /// byte sequence and the timestamp is populated if the caller left it
    /// unset.
    pub fn into_record(self) -> Result<ProducerRecord> {
        let payload = match self.payload {
            OutboundPayload::Bytes(bytes) => bytes,
            OutboundPayload::Text(text) => text.into_bytes(),
            OutboundPayload::Json(value) => serde_json::to_vec(&value)?,
        };

        let timestamp = self
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        Ok(ProducerRecord {
            topic: self.topic,
            partition: self.partition,
            payload,
            key: self.key,
            timestamp,
        })
    }
}

/// A fully normalized message handed to the underlying publish primitive.
#[derive(Debug, Clone)]
pub struct ProducerRecord {
    pub topic: String,
    pub partition: Option<i32>,
    pub payload: Vec<u8>,
    pub key: Option<Vec<u8>>,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Sample {
        x: i32,
    }

    #[test]
    fn json_payload_normalizes_to_utf8_bytes() {
        let msg = OutboundMessage::json("t", &Sample { x: 1 }).unwrap();
        let record = msg.into_record().unwrap();
        assert_eq!(record.payload, br#"{"x":1}"#.to_vec());
    }

    #[test]
    fn text_payload_normalizes_to_bytes() {
        let record = OutboundMessage::text("t", "hello").into_record().unwrap();
        assert_eq!(record.payload, b"hello".to_vec());
    }

    #[test]
    fn byte_payload_passes_through() {
        let record = OutboundMessage::bytes("t", vec![1u8, 2, 3])
            .into_record()
            .unwrap();
        assert_eq!(record.payload, vec![1u8, 2, 3]);
    }

    #[test]
    fn missing_timestamp_defaults_to_now() {
        let before = chrono::Utc::now().timestamp_millis();
        let record = OutboundMessage::text("t", "x").into_record().unwrap();
        let after = chrono::Utc::now().timestamp_millis();
        assert!(record.timestamp >= before && record.timestamp <= after);
    }

    #[test]
    fn explicit_timestamp_is_kept() {
        let record = OutboundMessage::text("t", "x")
            .timestamp(42)
            .into_record()
            .unwrap();
        assert_eq!(record.timestamp, 42);
    }

    #[test]
    fn partition_passes_through_only_when_set() {
        let record = OutboundMessage::text("t", "x").into_record().unwrap();
        assert_eq!(record.partition, None);

        let record = OutboundMessage::text("t", "x")
            .partition(3)
            .into_record()
            .unwrap();
        assert_eq!(record.partition, Some(3));
    }
}
