//! The consumption loop and its backoff state machine, plus the
//! committed-offset retry wrapper.

use crate::broker::{CommittedOffset, ConsumeClient, TopicSpec, WatermarkOffsets};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::kafka::KafkaConsumerClient;
use crate::message::IncomingMessage;
use rand::Rng;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Consecutive-error multiplier cap for the backoff window.
const MAX_BACKOFF_FACTOR: u32 = 10;

/// External stop signal for a running consumption loop.
///
/// The loop checks it once per cycle boundary, so cancellation takes
/// effect after the in-flight pull/handle completes.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Ask the consumption loop to terminate at the next cycle boundary.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// A consuming client: a [`Connection`] plus the consumption loop state.
pub struct Consumer<C: ConsumeClient + 'static> {
    connection: Connection<C>,
    running: Arc<AtomicBool>,
    consecutive_errors: AtomicU32,
}

impl Consumer<KafkaConsumerClient> {
    /// Build an rdkafka-backed consumer from configuration.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let client = KafkaConsumerClient::from_config(&config)?;
        Ok(Self::new(client, config))
    }
}

impl<C: ConsumeClient + 'static> Consumer<C> {
    pub fn new(client: C, config: ClientConfig) -> Self {
        Self {
            connection: Connection::new(Arc::new(client), Arc::new(config)),
            running: Arc::new(AtomicBool::new(true)),
            consecutive_errors: AtomicU32::new(0),
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

    /// Subscribe to the given topics.
    pub fn subscribe(&self, topics: &[String]) -> Result<()> {
        self.connection.client().subscribe(topics)
    }

    /// Handle for stopping a running consumption loop.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Consecutive failed cycles since the last successful pull.
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::SeqCst)
    }

    fn config(&self) -> &ClientConfig {
        self.connection.config()
    }

    /// Run the consumption loop until the stop handle fires.
    ///
    /// Pulls one message at a time and awaits the handler before the next
    /// pull, so at most one message is in flight through the handler. When
    /// the topic is empty the loop sleeps `poll_interval` between pulls.
    /// Any pull or handler failure is logged and followed by a jittered
    /// backoff delay scaled by the consecutive-error count; errors never
    /// terminate the loop.
    pub async fn consume<F, Fut>(&self, mut handler: F)
    where
        F: FnMut(IncomingMessage) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<()>> + Send,
    {
        while self.running.load(Ordering::SeqCst) {
            let failure = match self.connection.client().consume_one().await {
                Ok(Some(msg)) => {
                    self.consecutive_errors.store(0, Ordering::SeqCst);
                    handler(msg).await.err()
                }
                Ok(None) => {
                    self.consecutive_errors.store(0, Ordering::SeqCst);
                    tokio::time::sleep(self.config().poll_interval).await;
                    None
                }
                Err(e) => Some(e.into()),
            };

            if let Some(e) = failure {
                let errors = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                let delay = sample_backoff(
                    self.config().backoff_min,
                    self.config().backoff_max,
                    errors,
                );
                tracing::error!(
                    error = %e,
                    consecutive_errors = errors,
                    backoff_ms = delay.as_millis() as u64,
                    "consume cycle failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Query the consumer group's committed offsets.
    ///
    /// Partitions default to 0 when a spec carries only a topic name. On
    /// failure the query is retried up to `committed_retries` times with
    /// `committed_retry_delay` between attempts, logging a warning per
    /// retry; the attempt count is scoped to this call. The final failure
    /// propagates.
    pub async fn committed(&self, specs: Vec<TopicSpec>) -> Result<Vec<CommittedOffset>> {
        let partitions: Vec<_> = specs
            .into_iter()
            .map(TopicSpec::into_partition)
            .collect();

        let mut attempt = 0u32;
        loop {
            match self
                .connection
                .client()
                .committed_offsets(&partitions, self.config().offset_timeout)
                .await
            {
                Ok(offsets) => return Ok(offsets),
                Err(e) if attempt < self.config().committed_retries => {
                    tracing::warn!(
                        attempt,
                        error = %e,
                        "failed to get committed offsets, will try again"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config().committed_retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Backoff window for the given consecutive-error count: both bounds grow
/// linearly with the count, capped at a 10x multiplier.
pub(crate) fn backoff_window(min: Duration, max: Duration, errors: u32) -> (Duration, Duration) {
    let factor = errors.min(MAX_BACKOFF_FACTOR);
    (min * factor, max * factor)
}

/// Uniformly sampled delay from the backoff window (jitter, so multiple
/// loop instances don't retry in lockstep).
pub(crate) fn sample_backoff(min: Duration, max: Duration, errors: u32) -> Duration {
    let (low, high) = backoff_window(min, max, errors);
    let millis = rand::rng().random_range(low.as_millis() as u64..=high.as_millis() as u64);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_window_scales_linearly_and_caps_at_ten() {
        let min = Duration::from_millis(1000);
        let max = Duration::from_millis(2000);

        assert_eq!(
            backoff_window(min, max, 1),
            (Duration::from_millis(1000), Duration::from_millis(2000))
        );
        assert_eq!(
            backoff_window(min, max, 3),
            (Duration::from_millis(3000), Duration::from_millis(6000))
        );
        assert_eq!(
            backoff_window(min, max, 10),
            (Duration::from_millis(10000), Duration::from_millis(20000))
        );
        // Capped beyond ten consecutive errors
        assert_eq!(backoff_window(min, max, 20), backoff_window(min, max, 10));
    }

    #[test]
    fn sampled_backoff_stays_within_window() {
        let min = Duration::from_millis(1000);
        let max = Duration::from_millis(2000);

        for errors in 1..=20u32 {
            let (low, high) = backoff_window(min, max, errors);
            for _ in 0..50 {
                let delay = sample_backoff(min, max, errors);
                assert!(delay >= low && delay <= high, "errors={errors} delay={delay:?}");
            }
        }
    }
}
