//! rdkafka-backed implementations of the broker traits.
//!
//! librdkafka establishes connections lazily, so `connect()` is a bounded
//! metadata probe that forces and verifies broker reachability. The
//! delivery contract of [`KafkaProducerClient::publish`] is awaited-send:
//! the call resolves once the broker accepts the record and errors on
//! rejection.

use crate::broker::{
    BrokerClient, ClusterMetadata, CommittedOffset, ConsumeClient, ProduceClient, TopicMetadata,
    TopicPartition, WatermarkOffsets,
};
use crate::config::{BrokerEvent, ClientConfig, ClientRole, EventHandler};
use crate::error::{Error, Result};
use crate::message::{IncomingMessage, ProducerRecord};
use async_trait::async_trait;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::consumer::{Consumer as RdkafkaConsumer, ConsumerContext, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message as RdkafkaMessage;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as RdkafkaProducer};
use rdkafka::{ClientContext, Offset, TopicPartitionList};
use std::time::Duration;

/// How long a single pull waits for a message before reporting "empty".
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Client context that forwards librdkafka's asynchronous error and log
/// callbacks to caller-registered event handlers.
///
/// These callbacks fire outside any request/response call and are not
/// modeled as failures of a specific operation.
pub struct EventContext {
    handlers: Vec<EventHandler>,
}

impl EventContext {
    fn new(handlers: Vec<EventHandler>) -> Self {
        Self { handlers }
    }

    fn emit(&self, event: BrokerEvent) {
        for handler in &self.handlers {
            handler(event.clone());
        }
    }
}

impl ClientContext for EventContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        tracing::debug!(?level, facility = fac, "{log_message}");
        self.emit(BrokerEvent::Log {
            facility: fac.to_string(),
            message: log_message.to_string(),
        });
    }

    fn error(&self, error: KafkaError, reason: &str) {
        tracing::error!(%error, "client error: {reason}");
        self.emit(BrokerEvent::Error {
            reason: reason.to_string(),
        });
    }
}

impl ConsumerContext for EventContext {}

fn build_rdkafka_config(config: &ClientConfig) -> rdkafka::ClientConfig {
    let mut rd = rdkafka::ClientConfig::new();
    for (key, value) in config.global.iter().chain(config.topic.iter()) {
        rd.set(key, value);
    }
    rd
}

fn metadata_from_rdkafka(metadata: &rdkafka::metadata::Metadata) -> ClusterMetadata {
    ClusterMetadata {
        topics: metadata
            .topics()
            .iter()
            .map(|t| TopicMetadata {
                name: t.name().to_string(),
                partitions: t.partitions().iter().map(|p| p.id()).collect(),
            })
            .collect(),
    }
}

/// Consumer-role client backed by an rdkafka [`StreamConsumer`].
pub struct KafkaConsumerClient {
    inner: StreamConsumer<EventContext>,
    connect_timeout: Duration,
}

impl KafkaConsumerClient {
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let inner = build_rdkafka_config(config)
            .create_with_context(EventContext::new(config.event_handlers.clone()))?;
        Ok(Self {
            inner,
            connect_timeout: config.connect_timeout,
        })
    }

    /// Access the underlying consumer (for advanced use cases).
    pub fn inner(&self) -> &StreamConsumer<EventContext> {
        &self.inner
    }
}

#[async_trait]
impl BrokerClient for KafkaConsumerClient {
    async fn connect(&self) -> Result<()> {
        self.inner
            .client()
            .fetch_metadata(None, self.connect_timeout)?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.unsubscribe();
        Ok(())
    }

    async fn fetch_metadata(&self, timeout: Duration) -> Result<ClusterMetadata> {
        let metadata = self.inner.client().fetch_metadata(None, timeout)?;
        Ok(metadata_from_rdkafka(&metadata))
    }

    async fn query_watermark_offsets(
        &self,
        topic: &str,
        partition: i32,
        timeout: Duration,
    ) -> Result<WatermarkOffsets> {
        let (low, high) = self
            .inner
            .client()
            .fetch_watermarks(topic, partition, timeout)?;
        Ok(WatermarkOffsets { low, high })
    }
}

#[async_trait]
impl ConsumeClient for KafkaConsumerClient {
    async fn consume_one(&self) -> Result<Option<IncomingMessage>> {
        match tokio::time::timeout(RECV_TIMEOUT, self.inner.recv()).await {
            Ok(Ok(msg)) => Ok(Some(IncomingMessage {
                topic: msg.topic().to_string(),
                partition: msg.partition(),
                offset: msg.offset(),
                payload: msg.payload().map(|p| p.to_vec()),
                key: msg.key().map(|k| k.to_vec()),
                timestamp: msg.timestamp().to_millis(),
            })),
            Ok(Err(e)) => Err(e.into()),
            // No message arrived within the window
            Err(_) => Ok(None),
        }
    }

    fn subscribe(&self, topics: &[String]) -> Result<()> {
        let refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.inner.subscribe(&refs)?;
        Ok(())
    }

    async fn committed_offsets(
        &self,
        partitions: &[TopicPartition],
        timeout: Duration,
    ) -> Result<Vec<CommittedOffset>> {
        let mut tpl = TopicPartitionList::new();
        for tp in partitions {
            tpl.add_partition(&tp.topic, tp.partition);
        }

        let committed = self.inner.committed_offsets(tpl, timeout)?;
        Ok(committed
            .elements()
            .iter()
            .map(|elem| CommittedOffset {
                topic: elem.topic().to_string(),
                partition: elem.partition(),
                offset: match elem.offset() {
                    Offset::Offset(n) => Some(n),
                    _ => None,
                },
            })
            .collect())
    }
}

/// Producer-role client backed by an rdkafka [`FutureProducer`].
pub struct KafkaProducerClient {
    inner: FutureProducer<EventContext>,
    connect_timeout: Duration,
    offset_timeout: Duration,
}

impl KafkaProducerClient {
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let inner = build_rdkafka_config(config)
            .create_with_context(EventContext::new(config.event_handlers.clone()))?;
        Ok(Self {
            inner,
            connect_timeout: config.connect_timeout,
            offset_timeout: config.offset_timeout,
        })
    }

    /// Access the underlying producer (for advanced use cases).
    pub fn inner(&self) -> &FutureProducer<EventContext> {
        &self.inner
    }
}

#[async_trait]
impl BrokerClient for KafkaProducerClient {
    async fn connect(&self) -> Result<()> {
        self.inner
            .client()
            .fetch_metadata(None, self.connect_timeout)?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        // Deliver anything still queued before releasing the handle
        self.inner.flush(self.offset_timeout)?;
        Ok(())
    }

    async fn fetch_metadata(&self, timeout: Duration) -> Result<ClusterMetadata> {
        let metadata = self.inner.client().fetch_metadata(None, timeout)?;
        Ok(metadata_from_rdkafka(&metadata))
    }

    async fn query_watermark_offsets(
        &self,
        topic: &str,
        partition: i32,
        timeout: Duration,
    ) -> Result<WatermarkOffsets> {
        let (low, high) = self
            .inner
            .client()
            .fetch_watermarks(topic, partition, timeout)?;
        Ok(WatermarkOffsets { low, high })
    }
}

#[async_trait]
impl ProduceClient for KafkaProducerClient {
    async fn publish(&self, record: ProducerRecord) -> Result<()> {
        let mut future_record: FutureRecord<'_, Vec<u8>, Vec<u8>> =
            FutureRecord::to(&record.topic)
                .payload(&record.payload)
                .timestamp(record.timestamp);
        if let Some(key) = &record.key {
            future_record = future_record.key(key);
        }
        if let Some(partition) = record.partition {
            future_record = future_record.partition(partition);
        }

        self.inner
            .send(future_record, self.offset_timeout)
            .await
            .map_err(|(e, _)| {
                Error::Broker(format!(
                    "failed to deliver message to {}: {e}",
                    record.topic
                ))
            })?;

        Ok(())
    }
}

/// Role-tagged rdkafka client, for callers that select the role from
/// configuration rather than through the typed constructors.
pub enum KafkaClient {
    Consumer(KafkaConsumerClient),
    Producer(KafkaProducerClient),
}

impl KafkaClient {
    pub fn from_role(role: ClientRole, config: &ClientConfig) -> Result<Self> {
        match role {
            ClientRole::Consumer => Ok(KafkaClient::Consumer(KafkaConsumerClient::from_config(
                config,
            )?)),
            ClientRole::Producer => Ok(KafkaClient::Producer(KafkaProducerClient::from_config(
                config,
            )?)),
        }
    }
}
