use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Role of the underlying Kafka client.
///
/// Selected at construction; an unknown role string is a permanent
/// configuration error and is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRole {
    Consumer,
    Producer,
}

impl FromStr for ClientRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "consumer" => Ok(ClientRole::Consumer),
            "producer" => Ok(ClientRole::Producer),
            other => Err(Error::InvalidConfig(format!(
                "unknown client role: {other}"
            ))),
        }
    }
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientRole::Consumer => write!(f, "consumer"),
            ClientRole::Producer => write!(f, "producer"),
        }
    }
}

/// Out-of-band events surfaced by the underlying client.
///
/// These fire asynchronously and are not failures of any specific call.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// Client-level error callback (e.g. broker transport failure).
    Error { reason: String },
    /// librdkafka log line forwarded to the application.
    Log { facility: String, message: String },
}

/// Caller-registered callback invoked for every [`BrokerEvent`].
pub type EventHandler = Arc<dyn Fn(BrokerEvent) + Send + Sync>;

/// Configuration for a Kafka connection, consumer or publisher.
///
/// `global` and `topic` are opaque key/value maps passed straight through
/// to the underlying client (librdkafka property names). The remaining
/// fields are the timing policy of the resilience layer.
#[derive(Clone)]
pub struct ClientConfig {
    /// Global client properties (e.g. "bootstrap.servers", "group.id")
    pub global: HashMap<String, String>,
    /// Default topic properties (e.g. "auto.offset.reset")
    pub topic: HashMap<String, String>,
    /// Retry failed connect attempts indefinitely instead of surfacing the error
    pub auto_reconnect: bool,
    /// Delay between connect retries when `auto_reconnect` is set
    pub connect_retry_delay: Duration,
    /// Timeout for the connectivity probe of a single connect attempt
    pub connect_timeout: Duration,
    /// Timeout for metadata fetches
    pub metadata_timeout: Duration,
    /// Timeout for committed-offset and watermark-offset queries
    pub offset_timeout: Duration,
    /// Interval between metadata polls while waiting for topics to exist
    pub topic_poll_interval: Duration,
    /// Interval between pulls when the topic has no messages
    pub poll_interval: Duration,
    /// Lower bound of the consume-loop backoff window, scaled by the error count
    pub backoff_min: Duration,
    /// Upper bound of the consume-loop backoff window, scaled by the error count
    pub backoff_max: Duration,
    /// Number of retries for committed-offset queries before giving up
    pub committed_retries: u32,
    /// Delay between committed-offset retries
    pub committed_retry_delay: Duration,
    /// Handlers for out-of-band client events
    pub event_handlers: Vec<EventHandler>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            global: HashMap::new(),
            topic: HashMap::new(),
            auto_reconnect: true,
            connect_retry_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            metadata_timeout: Duration::from_secs(10),
            offset_timeout: Duration::from_secs(10),
            topic_poll_interval: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            backoff_min: Duration::from_millis(1000),
            backoff_max: Duration::from_millis(2000),
            committed_retries: 10,
            committed_retry_delay: Duration::from_secs(1),
            event_handlers: Vec::new(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("global", &self.global)
            .field("topic", &self.topic)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("connect_retry_delay", &self.connect_retry_delay)
            .field("connect_timeout", &self.connect_timeout)
            .field("metadata_timeout", &self.metadata_timeout)
            .field("offset_timeout", &self.offset_timeout)
            .field("topic_poll_interval", &self.topic_poll_interval)
            .field("poll_interval", &self.poll_interval)
            .field("backoff_min", &self.backoff_min)
            .field("backoff_max", &self.backoff_max)
            .field("committed_retries", &self.committed_retries)
            .field("committed_retry_delay", &self.committed_retry_delay)
            .field("event_handlers", &self.event_handlers.len())
            .finish()
    }
}

impl ClientConfig {
    /// Create a config with the given global properties and defaults for
    /// everything else.
    pub fn new(global: HashMap<String, String>) -> Self {
        Self {
            global,
            ..Self::default()
        }
    }

    /// Set a global client property.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.global.insert(key.into(), value.into());
        self
    }

    /// Set a default topic property.
    pub fn set_topic(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.topic.insert(key.into(), value.into());
        self
    }

    /// Register a handler for out-of-band client events.
    pub fn on_event(mut self, handler: EventHandler) -> Self {
        self.event_handlers.push(handler);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_known_values() {
        assert_eq!("consumer".parse::<ClientRole>().unwrap(), ClientRole::Consumer);
        assert_eq!("producer".parse::<ClientRole>().unwrap(), ClientRole::Producer);
    }

    #[test]
    fn unknown_role_is_a_config_error() {
        let err = "streamer".parse::<ClientRole>().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(err.to_string().contains("streamer"));
    }

    #[test]
    fn defaults_match_documented_policy() {
        let config = ClientConfig::default();
        assert!(config.auto_reconnect);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.backoff_min, Duration::from_millis(1000));
        assert_eq!(config.backoff_max, Duration::from_millis(2000));
        assert_eq!(config.topic_poll_interval, Duration::from_secs(5));
        assert_eq!(config.committed_retries, 10);
    }
}
