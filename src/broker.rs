//! The seam between the resilience layer and the wire-protocol client.
//!
//! [`Connection`](crate::connection::Connection), [`Consumer`](crate::consumer::Consumer)
//! and [`Publisher`](crate::producer::Publisher) are generic over these
//! traits; the rdkafka-backed implementations live in [`crate::kafka`] and
//! a scripted mock for tests lives in [`crate::testing`].

use crate::error::Result;
use crate::message::{IncomingMessage, ProducerRecord};
use async_trait::async_trait;
use std::time::Duration;

/// Topic metadata as reported by the cluster.
#[derive(Debug, Clone)]
pub struct TopicMetadata {
    /// Topic name
    pub name: String,
    /// Partition ids of the topic
    pub partitions: Vec<i32>,
}

/// Cluster metadata, reduced to what this layer consumes.
#[derive(Debug, Clone, Default)]
pub struct ClusterMetadata {
    pub topics: Vec<TopicMetadata>,
}

impl ClusterMetadata {
    /// Whether a topic of the given name exists in the cluster.
    pub fn has_topic(&self, name: &str) -> bool {
        self.topics.iter().any(|t| t.name == name)
    }
}

/// A topic/partition pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

/// Lowest and highest available offsets for a topic partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkOffsets {
    pub low: i64,
    pub high: i64,
}

/// Last offset durably recorded as processed by the consumer group.
///
/// `offset` is `None` when the group has no committed offset for the
/// partition yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: Option<i64>,
}

/// A topic reference as accepted by offset queries: either a bare name
/// (partition defaults to 0) or an explicit topic/partition pair.
#[derive(Debug, Clone)]
pub enum TopicSpec {
    Topic(String),
    Partition(TopicPartition),
}

impl TopicSpec {
    /// Resolve to a concrete topic/partition, defaulting the partition to 0.
    pub fn into_partition(self) -> TopicPartition {
        match self {
            TopicSpec::Topic(topic) => TopicPartition { topic, partition: 0 },
            TopicSpec::Partition(tp) => tp,
        }
    }
}

impl From<&str> for TopicSpec {
    fn from(topic: &str) -> Self {
        TopicSpec::Topic(topic.to_string())
    }
}

impl From<String> for TopicSpec {
    fn from(topic: String) -> Self {
        TopicSpec::Topic(topic)
    }
}

impl From<(&str, i32)> for TopicSpec {
    fn from((topic, partition): (&str, i32)) -> Self {
        TopicSpec::Partition(TopicPartition {
            topic: topic.to_string(),
            partition,
        })
    }
}

impl From<TopicPartition> for TopicSpec {
    fn from(tp: TopicPartition) -> Self {
        TopicSpec::Partition(tp)
    }
}

/// Primitives shared by both client roles.
///
/// A single underlying client handle is exclusively owned by one
/// implementation instance; handles are never shared.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Establish (or verify) connectivity to the broker. A single attempt;
    /// retry policy lives in [`Connection`](crate::connection::Connection).
    async fn connect(&self) -> Result<()>;

    /// Release the underlying handle.
    async fn disconnect(&self) -> Result<()>;

    /// Fetch cluster metadata. Single attempt, bounded by `timeout`.
    async fn fetch_metadata(&self, timeout: Duration) -> Result<ClusterMetadata>;

    /// Query the low/high watermark offsets of one topic partition.
    async fn query_watermark_offsets(
        &self,
        topic: &str,
        partition: i32,
        timeout: Duration,
    ) -> Result<WatermarkOffsets>;
}

/// Primitives available to the consumer role.
#[async_trait]
pub trait ConsumeClient: BrokerClient {
    /// Pull at most one message. `Ok(None)` means the topic currently has
    /// no messages for this consumer.
    async fn consume_one(&self) -> Result<Option<IncomingMessage>>;

    /// Subscribe to the given topics.
    fn subscribe(&self, topics: &[String]) -> Result<()>;

    /// Query the consumer group's committed offsets. Single attempt;
    /// retry policy lives in [`Consumer`](crate::consumer::Consumer).
    async fn committed_offsets(
        &self,
        partitions: &[TopicPartition],
        timeout: Duration,
    ) -> Result<Vec<CommittedOffset>>;
}

/// Primitives available to the producer role.
#[async_trait]
pub trait ProduceClient: BrokerClient {
    /// Publish one normalized record. Resolves once the broker has
    /// accepted the record and errors on rejection (awaited-send contract).
    async fn publish(&self, record: ProducerRecord) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_topic_spec_defaults_partition_to_zero() {
        let tp = TopicSpec::from("events").into_partition();
        assert_eq!(tp.topic, "events");
        assert_eq!(tp.partition, 0);
    }

    #[test]
    fn explicit_partition_is_kept() {
        let tp = TopicSpec::from(("events", 4)).into_partition();
        assert_eq!(tp.partition, 4);
    }

    #[test]
    fn metadata_topic_lookup() {
        let metadata = ClusterMetadata {
            topics: vec![TopicMetadata {
                name: "a".to_string(),
                partitions: vec![0, 1],
            }],
        };
        assert!(metadata.has_topic("a"));
        assert!(!metadata.has_topic("b"));
    }
}
