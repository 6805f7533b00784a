//! Outbound message publishing.

use crate::broker::{ProduceClient, TopicSpec, WatermarkOffsets};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::kafka::KafkaProducerClient;
use crate::message::OutboundMessage;
use std::sync::Arc;

/// A producing client: a [`Connection`] plus payload normalization.
///
/// Delivery contract: awaited send. [`Publisher::publish`] resolves once
/// the underlying client confirms acceptance and errors on rejection.
pub struct Publisher<C: ProduceClient + 'static> {
    connection: Connection<C>,
}

impl Publisher<KafkaProducerClient> {
    /// Build an rdkafka-backed publisher from configuration.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let client = KafkaProducerClient::from_config(&config)?;
        Ok(Self::new(client, config))
    }
}

impl<C: ProduceClient + 'static> Publisher<C> {
    pub fn new(client: C, config: ClientConfig) -> Self {
        Self {
            connection: Connection::new(Arc::new(client), Arc::new(config)),
        }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection<C> {
        &self.connection
    }

    /// See [`Connection::connect`].
    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    /// See [`Connection::disconnect`].
    pub async fn disconnect(&self) -> Result<()> {
        self.connection.disconnect().await
    }

    /// See [`Connection::wait_for_topics`].
    pub async fn wait_for_topics(&self, topics: &[String]) -> Result<()> {
        self.connection.wait_for_topics(topics).await
    }

    /// See [`Connection::query_watermark_offsets`].
    pub async fn query_watermark_offsets(
        &self,
        spec: impl Into<TopicSpec>,
    ) -> Result<WatermarkOffsets> {
        self.connection.query_watermark_offsets(spec).await
    }

    /// Normalize and publish one message.
    ///
    /// Structured payloads are serialized to JSON text, text payloads to
    /// UTF-8 bytes, and a missing timestamp is set to the current time
    /// before handoff to the underlying publish primitive.
    pub async fn publish(&self, message: OutboundMessage) -> Result<()> {
        let record = message.into_record()?;
        self.connection.client().publish(record).await
    }
}
