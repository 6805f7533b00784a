//! Resilience layer over a Kafka client connection.
//!
//! Every operation against the broker is wrapped so that transient
//! failure never terminates the caller's logical operation, only delays
//! it.
//!
//! Features:
//!
//! - Consumption Loop: one message at a time with handler backpressure and
//!   jittered, escalating backoff on failure
//! - Connection Lifecycle: de-duplicated connect with indefinite auto-retry
//! - Topic Readiness: poll until a set of topics exists in cluster metadata,
//!   sharing one poll sequence across concurrent waiters
//! - Offset Queries: bounded retry for committed offsets, single-shot
//!   watermark lookups
//! - Publishing: payload normalization (object to JSON to bytes, timestamp
//!   defaulting) with an awaited-send delivery contract

/// Broker-client traits and metadata types (the seam to the wire client)
pub mod broker;

/// Client configuration, roles and event handlers
pub mod config;

/// Connection lifecycle, connect de-duplication and topic readiness
pub mod connection;

/// Consumption loop, backoff state machine and committed-offset retry
pub mod consumer;

pub mod error;

/// rdkafka-backed implementations of the broker traits
pub mod kafka;

/// Process-wide logging initialization
pub mod logging;

/// Inbound/outbound message types and payload normalization
pub mod message;

/// Outbound publishing
pub mod producer;

/// Scripted broker mock for tests
pub mod testing;

// Re-export main types for easy access
pub use broker::{
    BrokerClient, ClusterMetadata, CommittedOffset, ConsumeClient, ProduceClient, TopicMetadata,
    TopicPartition, TopicSpec, WatermarkOffsets,
};
pub use config::{BrokerEvent, ClientConfig, ClientRole, EventHandler};
pub use connection::{Connection, ConnectionState};
pub use consumer::{Consumer, StopHandle};
pub use error::{Error, Result};
pub use kafka::{KafkaClient, KafkaConsumerClient, KafkaProducerClient};
pub use message::{IncomingMessage, OutboundMessage, OutboundPayload, ProducerRecord};
pub use producer::Publisher;
