//! Scripted broker mock for exercising the resilience layer without a
//! running Kafka cluster. Used by this crate's tests; exported so
//! downstream crates can test their handlers the same way.

use crate::broker::{
    BrokerClient, ClusterMetadata, CommittedOffset, ConsumeClient, ProduceClient, TopicMetadata,
    TopicPartition, WatermarkOffsets,
};
use crate::error::{Error, Result};
use crate::message::{IncomingMessage, ProducerRecord};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Outcome of one scripted `consume_one` call.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// No message available
    Empty,
    /// One message pulled
    Message(IncomingMessage),
    /// Pull failure
    Fail(String),
}

/// A broker client with scripted behavior and operation counters.
///
/// Defaults: connects on the first attempt, reports no topics, has no
/// messages, and answers offset queries successfully.
#[derive(Default)]
pub struct MockBroker {
    /// Number of `connect` calls observed
    pub connect_attempts: AtomicU32,
    /// Number of `fetch_metadata` calls observed
    pub metadata_fetches: AtomicU32,
    /// Number of `committed_offsets` calls observed
    pub committed_attempts: AtomicU32,
    /// Number of `disconnect` calls observed
    pub disconnects: AtomicU32,

    connect_failures_remaining: AtomicU32,
    connect_delay: Mutex<Duration>,
    metadata_failing: Mutex<bool>,
    topics: Mutex<Vec<String>>,
    poll_script: Mutex<VecDeque<PollOutcome>>,
    committed_failures_remaining: AtomicU32,
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<ProducerRecord>>,
    watermark_queries: Mutex<Vec<TopicPartition>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` connect attempts.
    pub fn fail_connects(&self, count: u32) {
        self.connect_failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Make every connect attempt take `delay` before resolving.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = delay;
    }

    /// Make `fetch_metadata` fail until cleared.
    pub fn set_metadata_failing(&self, failing: bool) {
        *self.metadata_failing.lock().unwrap() = failing;
    }

    /// Replace the set of topics reported by `fetch_metadata`.
    pub fn set_topics(&self, topics: &[&str]) {
        *self.topics.lock().unwrap() = topics.iter().map(|t| t.to_string()).collect();
    }

    /// Append outcomes to the `consume_one` script. Once the script is
    /// exhausted every pull reports "no message".
    pub fn script_polls(&self, outcomes: impl IntoIterator<Item = PollOutcome>) {
        self.poll_script.lock().unwrap().extend(outcomes);
    }

    /// Fail the next `count` committed-offset queries.
    pub fn fail_committed(&self, count: u32) {
        self.committed_failures_remaining
            .store(count, Ordering::SeqCst);
    }

    /// Topics subscribed so far.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Records published so far.
    pub fn published(&self) -> Vec<ProducerRecord> {
        self.published.lock().unwrap().clone()
    }

    /// Topic/partition pairs queried for watermarks so far.
    pub fn watermark_queries(&self) -> Vec<TopicPartition> {
        self.watermark_queries.lock().unwrap().clone()
    }

    /// A minimal incoming message for poll scripts.
    pub fn message(topic: &str, offset: i64, payload: &[u8]) -> IncomingMessage {
        IncomingMessage {
            topic: topic.to_string(),
            partition: 0,
            offset,
            payload: Some(payload.to_vec()),
            key: None,
            timestamp: Some(0),
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn connect(&self) -> Result<()> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if Self::take_failure(&self.connect_failures_remaining) {
            return Err(Error::Broker("scripted connect failure".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_metadata(&self, _timeout: Duration) -> Result<ClusterMetadata> {
        self.metadata_fetches.fetch_add(1, Ordering::SeqCst);
        if *self.metadata_failing.lock().unwrap() {
            return Err(Error::Broker("scripted metadata failure".to_string()));
        }
        Ok(ClusterMetadata {
            topics: self
                .topics
                .lock()
                .unwrap()
                .iter()
                .map(|name| TopicMetadata {
                    name: name.clone(),
                    partitions: vec![0],
                })
                .collect(),
        })
    }

    async fn query_watermark_offsets(
        &self,
        topic: &str,
        partition: i32,
        _timeout: Duration,
    ) -> Result<WatermarkOffsets> {
        self.watermark_queries.lock().unwrap().push(TopicPartition {
            topic: topic.to_string(),
            partition,
        });
        Ok(WatermarkOffsets { low: 0, high: 42 })
    }
}

#[async_trait]
impl ConsumeClient for MockBroker {
    async fn consume_one(&self) -> Result<Option<IncomingMessage>> {
        let outcome = self.poll_script.lock().unwrap().pop_front();
        match outcome {
            Some(PollOutcome::Empty) | None => Ok(None),
            Some(PollOutcome::Message(msg)) => Ok(Some(msg)),
            Some(PollOutcome::Fail(reason)) => Err(Error::Broker(reason)),
        }
    }

    fn subscribe(&self, topics: &[String]) -> Result<()> {
        self.subscriptions.lock().unwrap().extend_from_slice(topics);
        Ok(())
    }

    async fn committed_offsets(
        &self,
        partitions: &[TopicPartition],
        _timeout: Duration,
    ) -> Result<Vec<CommittedOffset>> {
        self.committed_attempts.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.committed_failures_remaining) {
            return Err(Error::Broker("scripted committed failure".to_string()));
        }
        Ok(partitions
            .iter()
            .map(|tp| CommittedOffset {
                topic: tp.topic.clone(),
                partition: tp.partition,
                offset: Some(7),
            })
            .collect())
    }
}

#[async_trait]
impl ProduceClient for MockBroker {
    async fn publish(&self, record: ProducerRecord) -> Result<()> {
        self.published.lock().unwrap().push(record);
        Ok(())
    }
}
