//! Connection lifecycle and topic readiness.
//!
//! Every operation here is wrapped so that transient failure delays the
//! caller's logical operation instead of terminating it: connect retries
//! indefinitely (unless disabled), and topic readiness polls with no
//! retry ceiling. Pending operations are de-duplicated through shared
//! futures so concurrent callers never issue duplicate attempts.

use crate::broker::{BrokerClient, ClusterMetadata, TopicSpec, WatermarkOffsets};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Shared futures must produce a `Clone` output, so pending operations
/// resolve to a stringified error that callers rewrap.
type SharedAttempt = Shared<BoxFuture<'static, std::result::Result<(), String>>>;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

enum ConnectState {
    Disconnected,
    /// Exactly one connect attempt in flight; concurrent callers share it.
    Connecting(SharedAttempt),
    Connected,
}

/// A single broker connection with retrying connect, de-duplicated
/// pending operations, and topic-readiness polling.
///
/// Exclusively owns its underlying client handle; two `Connection`s never
/// share one handle.
pub struct Connection<C: BrokerClient + 'static> {
    client: Arc<C>,
    config: Arc<ClientConfig>,
    state: Mutex<ConnectState>,
    waiters: Arc<Mutex<HashMap<String, SharedAttempt>>>,
}

impl<C: BrokerClient + 'static> Connection<C> {
    pub fn new(client: Arc<C>, config: Arc<ClientConfig>) -> Self {
        Self {
            client,
            config,
            state: Mutex::new(ConnectState::Disconnected),
            waiters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The underlying client.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn state(&self) -> ConnectionState {
        match &*self.state.lock().await {
            ConnectState::Disconnected => ConnectionState::Disconnected,
            ConnectState::Connecting(_) => ConnectionState::Connecting,
            ConnectState::Connected => ConnectionState::Connected,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Connect to the broker.
    ///
    /// Idempotent with respect to concurrent callers: if an attempt is
    /// already outstanding, all callers await the same attempt and receive
    /// its result. With `auto_reconnect` (the default) a failed attempt is
    /// retried indefinitely and never surfaces to the caller; with it
    /// disabled the first failure is terminal. On success the pending
    /// attempt is cleared, so a `connect()` after `disconnect()` starts
    /// fresh.
    pub async fn connect(&self) -> Result<()> {
        let attempt = {
            let mut state = self.state.lock().await;
            match &*state {
                ConnectState::Connected => return Ok(()),
                ConnectState::Connecting(attempt) => attempt.clone(),
                ConnectState::Disconnected => {
                    let attempt = Self::connect_attempt(
                        Arc::clone(&self.client),
                        self.config.auto_reconnect,
                        self.config.connect_retry_delay,
                    )
                    .boxed()
                    .shared();
                    *state = ConnectState::Connecting(attempt.clone());
                    attempt
                }
            }
        };

        let result = attempt.await;

        let mut state = self.state.lock().await;
        if matches!(&*state, ConnectState::Connecting(_)) {
            *state = if result.is_ok() {
                ConnectState::Connected
            } else {
                ConnectState::Disconnected
            };
        }

        result.map_err(Error::Connect)
    }

    async fn connect_attempt(
        client: Arc<C>,
        auto_reconnect: bool,
        retry_delay: Duration,
    ) -> std::result::Result<(), String> {
        loop {
            match client.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if auto_reconnect => {
                    tracing::error!(error = %e, "failed to connect to broker, retrying");
                    tokio::time::sleep(retry_delay).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to connect to broker, giving up");
                    return Err(e.to_string());
                }
            }
        }
    }

    /// Disconnect from the broker. Fails only if the underlying
    /// disconnect primitive reports an error.
    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        *self.state.lock().await = ConnectState::Disconnected;
        Ok(())
    }

    /// Single-shot cluster metadata query.
    pub async fn metadata(&self) -> Result<ClusterMetadata> {
        self.client
            .fetch_metadata(self.config.metadata_timeout)
            .await
    }

    /// Query the low/high watermark offsets for a topic partition.
    /// Accepts a bare topic name (partition defaults to 0) or an explicit
    /// topic/partition pair. Single attempt, timeout-bounded.
    pub async fn query_watermark_offsets(
        &self,
        spec: impl Into<TopicSpec>,
    ) -> Result<WatermarkOffsets> {
        let tp = spec.into().into_partition();
        self.client
            .query_watermark_offsets(&tp.topic, tp.partition, self.config.offset_timeout)
            .await
    }

    /// Wait until every requested topic exists in cluster metadata.
    ///
    /// Polls metadata every `topic_poll_interval` with no retry ceiling;
    /// this is meant to wait out cluster bootstrap. Concurrent waiters for
    /// the same topic set share one polling sequence. An empty set is
    /// vacuously ready and issues no metadata fetch. A metadata-fetch
    /// error is not swallowed: it fails every waiter on the set.
    pub async fn wait_for_topics(&self, topics: &[String]) -> Result<()> {
        if topics.is_empty() {
            return Ok(());
        }

        let mut wanted = topics.to_vec();
        wanted.sort();
        wanted.dedup();
        let id = wanted.join(",");

        let wait = {
            let mut waiters = self.waiters.lock().await;
            match waiters.get(&id) {
                Some(wait) => wait.clone(),
                None => {
                    let client = Arc::clone(&self.client);
                    let registry = Arc::clone(&self.waiters);
                    let interval = self.config.topic_poll_interval;
                    let timeout = self.config.metadata_timeout;
                    let key = id.clone();
                    let wait = async move {
                        let result =
                            Self::poll_for_topics(client, &wanted, interval, timeout).await;
                        registry.lock().await.remove(&key);
                        result.map_err(|e| e.to_string())
                    }
                    .boxed()
                    .shared();
                    waiters.insert(id, wait.clone());
                    wait
                }
            }
        };

        wait.await.map_err(Error::Metadata)
    }

    async fn poll_for_topics(
        client: Arc<C>,
        topics: &[String],
        interval: Duration,
        timeout: Duration,
    ) -> Result<()> {
        loop {
            let metadata = client.fetch_metadata(timeout).await?;
            if topics.iter().all(|t| metadata.has_topic(t)) {
                return Ok(());
            }
            tracing::debug!(topics = ?topics, "not all topics exist yet, polling again");
            tokio::time::sleep(interval).await;
        }
    }
}
