//! Publishing and payload-normalization tests, backed by the scripted
//! broker mock.

use kafka_resilience::testing::MockBroker;
use kafka_resilience::{ClientConfig, OutboundMessage, Publisher};
use serde::Serialize;
use std::sync::atomic::Ordering;

fn publisher() -> Publisher<MockBroker> {
    Publisher::new(MockBroker::new(), ClientConfig::default())
}

#[derive(Serialize)]
struct Event {
    x: i32,
}

#[tokio::test]
async fn structured_payload_is_published_as_json_bytes() {
    let publisher = publisher();
    let before = chrono::Utc::now().timestamp_millis();

    publisher
        .publish(OutboundMessage::json("t", &Event { x: 1 }).unwrap())
        .await
        .unwrap();

    let published = publisher.connection().client().published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "t");
    assert_eq!(published[0].payload, br#"{"x":1}"#.to_vec());
    assert!(published[0].timestamp >= before);
    assert_eq!(published[0].partition, None);
}

#[tokio::test]
async fn text_payload_is_published_as_utf8_bytes() {
    let publisher = publisher();

    publisher
        .publish(OutboundMessage::text("t", "hello"))
        .await
        .unwrap();

    assert_eq!(
        publisher.connection().client().published()[0].payload,
        b"hello".to_vec()
    );
}

#[tokio::test]
async fn key_partition_and_timestamp_pass_through() {
    let publisher = publisher();

    publisher
        .publish(
            OutboundMessage::bytes("t", vec![9u8])
                .key(b"k".to_vec())
                .partition(2)
                .timestamp(1234),
        )
        .await
        .unwrap();

    let record = &publisher.connection().client().published()[0];
    assert_eq!(record.key, Some(b"k".to_vec()));
    assert_eq!(record.partition, Some(2));
    assert_eq!(record.timestamp, 1234);
}

#[tokio::test]
async fn publisher_delegates_connection_lifecycle() {
    let publisher = publisher();

    publisher.connect().await.unwrap();
    assert_eq!(
        publisher
            .connection()
            .client()
            .connect_attempts
            .load(Ordering::SeqCst),
        1
    );

    publisher.disconnect().await.unwrap();
    assert_eq!(
        publisher
            .connection()
            .client()
            .disconnects
            .load(Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn publisher_can_wait_for_topics() {
    let publisher = publisher();
    publisher.connection().client().set_topics(&["t"]);

    publisher
        .wait_for_topics(&["t".to_string()])
        .await
        .unwrap();

    assert_eq!(
        publisher
            .connection()
            .client()
            .metadata_fetches
            .load(Ordering::SeqCst),
        1
    );
}
