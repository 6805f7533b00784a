//! Connection lifecycle and topic-readiness tests, backed by the scripted
//! broker mock.

use kafka_resilience::testing::MockBroker;
use kafka_resilience::{ClientConfig, Connection, ConnectionState, Error, TopicPartition};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.connect_retry_delay = Duration::from_millis(1);
    config.topic_poll_interval = Duration::from_millis(20);
    config
}

fn connection(config: ClientConfig) -> Connection<MockBroker> {
    Connection::new(Arc::new(MockBroker::new()), Arc::new(config))
}

#[tokio::test]
async fn concurrent_connects_share_one_attempt() {
    let conn = connection(fast_config());
    conn.client().set_connect_delay(Duration::from_millis(50));

    let (a, b) = tokio::join!(conn.connect(), conn.connect());
    a.unwrap();
    b.unwrap();

    assert_eq!(conn.client().connect_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(conn.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn connect_retries_until_success() {
    let conn = connection(fast_config());
    conn.client().fail_connects(3);

    conn.connect().await.unwrap();

    assert_eq!(conn.client().connect_attempts.load(Ordering::SeqCst), 4);
    assert!(conn.is_connected().await);
}

#[tokio::test]
async fn connect_without_auto_reconnect_fails_terminally() {
    let mut config = fast_config();
    config.auto_reconnect = false;
    let conn = connection(config);
    conn.client().fail_connects(1);

    let err = conn.connect().await.unwrap_err();
    assert!(matches!(err, Error::Connect(_)));
    assert_eq!(conn.client().connect_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(conn.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn connect_after_disconnect_starts_fresh() {
    let conn = connection(fast_config());

    conn.connect().await.unwrap();
    conn.disconnect().await.unwrap();
    assert_eq!(conn.state().await, ConnectionState::Disconnected);

    conn.connect().await.unwrap();
    assert_eq!(conn.client().connect_attempts.load(Ordering::SeqCst), 2);
    assert!(conn.is_connected().await);
}

#[tokio::test]
async fn connect_is_a_no_op_when_already_connected() {
    let conn = connection(fast_config());

    conn.connect().await.unwrap();
    conn.connect().await.unwrap();

    assert_eq!(conn.client().connect_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_topic_set_is_ready_without_metadata_fetch() {
    let conn = connection(fast_config());

    conn.wait_for_topics(&[]).await.unwrap();

    assert_eq!(conn.client().metadata_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_waiters_share_one_poll_sequence() {
    let conn = connection(fast_config());
    conn.client().set_topics(&["a", "b"]);

    let set_one = vec!["a".to_string(), "b".to_string()];
    // Same set in a different order resolves to the same waiter identifier
    let set_two = vec!["b".to_string(), "a".to_string()];
    let (first, second) = tokio::join!(
        conn.wait_for_topics(&set_one),
        conn.wait_for_topics(&set_two)
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(conn.client().metadata_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn waits_until_topic_is_created() {
    let conn = connection(fast_config());

    let client = Arc::clone(conn.client());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.set_topics(&["late"]);
    });

    conn.wait_for_topics(&["late".to_string()]).await.unwrap();

    // At least the initial fetch plus one after the topic appeared
    assert!(conn.client().metadata_fetches.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn metadata_failure_ends_the_wait() {
    let conn = connection(fast_config());
    conn.client().set_metadata_failing(true);

    let err = conn
        .wait_for_topics(&["a".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Metadata(_)));

    // The failed waiter is gone; a later call starts a new poll sequence
    conn.client().set_metadata_failing(false);
    conn.client().set_topics(&["a"]);
    conn.wait_for_topics(&["a".to_string()]).await.unwrap();
}

#[tokio::test]
async fn watermark_query_defaults_partition_to_zero() {
    let conn = connection(fast_config());

    let offsets = conn.query_watermark_offsets("events").await.unwrap();
    assert_eq!(offsets.high, 42);

    assert_eq!(
        conn.client().watermark_queries(),
        vec![TopicPartition {
            topic: "events".to_string(),
            partition: 0,
        }]
    );
}

#[tokio::test]
async fn watermark_query_honors_explicit_partition() {
    let conn = connection(fast_config());

    conn.query_watermark_offsets(("events", 3)).await.unwrap();

    assert_eq!(conn.client().watermark_queries()[0].partition, 3);
}

#[tokio::test]
async fn metadata_is_a_single_shot_proxy() {
    let conn = connection(fast_config());
    conn.client().set_topics(&["a"]);

    let metadata = conn.metadata().await.unwrap();
    assert!(metadata.has_topic("a"));
    assert_eq!(conn.client().metadata_fetches.load(Ordering::SeqCst), 1);
}
