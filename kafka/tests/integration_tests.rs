//! Integration test against a live Kafka-compatible broker.
//!
//! Ignored by default: needs a reachable broker with the target topic
//! auto-creatable or pre-created. Run with:
//!
//! ```text
//! KAFKA_BROKERS=localhost:9092 \
//!     cargo test -p stampede-kafka -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // test code

use std::time::Duration;

use chrono::Utc;
use stampede_core::publish::{EVENT_TYPE, EventPublisher, ResourceRequestEvent, ResourceShape};
use stampede_kafka::KafkaResourcePublisher;

#[tokio::test]
#[ignore = "requires a live Kafka broker"]
async fn probe_then_publish_roundtrip() {
    let brokers =
        std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());

    let publisher = KafkaResourcePublisher::builder()
        .brokers(&brokers)
        .topic("resource-requests-it")
        .timeout(Duration::from_secs(5))
        .build()
        .expect("create publisher");
    publisher.probe().expect("broker reachable");

    let event = ResourceRequestEvent {
        event_type: EVENT_TYPE.to_string(),
        resource_id: 1,
        user_id: "it-user".to_string(),
        name: "it-instance".to_string(),
        shape: ResourceShape {
            cpus: 1,
            memory_mb: 1024,
            gpus: 0,
            image: "ubuntu:22.04".to_string(),
        },
        config_json: Vec::new(),
        emitted_at: Utc::now(),
    };
    publisher.publish(&event).await.expect("delivered");
}
