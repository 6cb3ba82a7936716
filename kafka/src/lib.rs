//! Kafka implementation of the Stampede event publisher.
//!
//! [`KafkaResourcePublisher`] delivers provisioning requests to the
//! downstream resource-manager topic. The broker is a soft dependency:
//! if it cannot be reached at startup, [`connect_or_noop`] degrades to
//! [`NoopResourcePublisher`] so the order path keeps working with
//! delivery disabled. The degraded mode is loud in the logs and never
//! silently swallows an event at publish time without saying so.
//!
//! # Delivery Semantics
//!
//! The producer waits for acknowledgement from all in-sync replicas
//! (`acks=all`) before a publish resolves. Orders are committed before
//! the event is sent, so a failed publish surfaces as a retryable
//! error to the caller rather than rolling back the order.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use stampede_core::publish::{EventPublisher, PublishError, ResourceRequestEvent, ROUTING_KEY};
use tracing::{debug, error, info, warn};

/// Kafka-backed [`EventPublisher`].
///
/// # Thread Safety
///
/// Shareable behind an `Arc`; the underlying producer multiplexes
/// sends internally.
pub struct KafkaResourcePublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaResourcePublisher {
    /// Create a builder for configuring the publisher.
    #[must_use]
    pub fn builder() -> KafkaResourcePublisherBuilder {
        KafkaResourcePublisherBuilder::default()
    }

    /// Probe the broker for topic metadata.
    ///
    /// Used at startup to decide between real and degraded delivery;
    /// blocks the calling thread for at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Failed`] if the broker cannot be
    /// reached within the timeout.
    pub fn probe(&self) -> Result<(), PublishError> {
        self.producer
            .client()
            .fetch_metadata(Some(&self.topic), self.timeout)
            .map_err(|e| PublishError::Failed(format!("broker metadata probe failed: {e}")))?;
        Ok(())
    }
}

/// Builder for a [`KafkaResourcePublisher`].
#[derive(Default)]
pub struct KafkaResourcePublisherBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    acks: Option<String>,
    timeout: Option<Duration>,
}

impl KafkaResourcePublisherBuilder {
    /// Set the comma-separated broker addresses.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the destination topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the producer acknowledgement mode.
    ///
    /// Default: "all". Provisioning requests are the only durable
    /// record handed downstream, so weaker modes trade away the
    /// at-least-once guarantee.
    #[must_use]
    pub fn acks(mut self, acks: impl Into<String>) -> Self {
        self.acks = Some(acks.into());
        self
    }

    /// Set the per-send timeout.
    ///
    /// Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the publisher.
    ///
    /// Creating the producer does not touch the network; pair with
    /// [`KafkaResourcePublisher::probe`] to verify reachability.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Failed`] if brokers or topic are unset
    /// or the producer configuration is invalid.
    pub fn build(self) -> Result<KafkaResourcePublisher, PublishError> {
        let brokers = self
            .brokers
            .ok_or_else(|| PublishError::Failed("brokers not configured".to_string()))?;
        let topic = self
            .topic
            .ok_or_else(|| PublishError::Failed("topic not configured".to_string()))?;
        let acks = self.acks.unwrap_or_else(|| "all".to_string());

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", &acks)
            .create()
            .map_err(|e| PublishError::Failed(format!("failed to create producer: {e}")))?;

        info!(brokers = %brokers, topic = %topic, acks = %acks, "Kafka publisher created");

        Ok(KafkaResourcePublisher {
            producer,
            topic,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
        })
    }
}

#[async_trait]
impl EventPublisher for KafkaResourcePublisher {
    async fn publish(&self, event: &ResourceRequestEvent) -> Result<(), PublishError> {
        let payload = event.to_bytes()?;
        // All provisioning requests share one key so the downstream
        // resource manager sees them in commit order.
        let record = FutureRecord::to(&self.topic)
            .payload(&payload)
            .key(ROUTING_KEY);

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                debug!(
                    topic = %self.topic,
                    partition,
                    offset,
                    resource_id = event.resource_id,
                    "provisioning request published"
                );
                metrics::counter!("stampede.publish.delivered").increment(1);
                Ok(())
            }
            Err((kafka_error, _)) => {
                error!(
                    topic = %self.topic,
                    resource_id = event.resource_id,
                    error = %kafka_error,
                    "failed to publish provisioning request"
                );
                metrics::counter!("stampede.publish.failed").increment(1);
                Err(PublishError::Failed(kafka_error.to_string()))
            }
        }
    }
}

/// Degraded-mode [`EventPublisher`]: accepts every event and delivers
/// none.
///
/// Stands in for the real publisher when the broker is down at
/// startup, keeping the order path alive. Every accepted event is
/// logged so the gap is visible and can be reconciled later.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResourcePublisher;

impl NoopResourcePublisher {
    /// Create a no-op publisher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for NoopResourcePublisher {
    async fn publish(&self, event: &ResourceRequestEvent) -> Result<(), PublishError> {
        warn!(
            resource_id = event.resource_id,
            user_id = %event.user_id,
            "delivery disabled, provisioning request dropped"
        );
        metrics::counter!("stampede.publish.dropped").increment(1);
        Ok(())
    }
}

/// Connect to Kafka, degrading to [`NoopResourcePublisher`] if the
/// broker is unreachable.
///
/// The probe blocks for at most `timeout`; call before entering the
/// async serving path.
#[must_use]
pub fn connect_or_noop(brokers: &str, topic: &str, timeout: Duration) -> Arc<dyn EventPublisher> {
    let publisher = KafkaResourcePublisher::builder()
        .brokers(brokers)
        .topic(topic)
        .timeout(timeout)
        .build()
        .and_then(|publisher| {
            publisher.probe()?;
            Ok(publisher)
        });

    match publisher {
        Ok(publisher) => Arc::new(publisher),
        Err(e) => {
            warn!(
                brokers = %brokers,
                topic = %topic,
                error = %e,
                "Kafka unreachable, running with delivery disabled"
            );
            Arc::new(NoopResourcePublisher::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stampede_core::publish::ResourceShape;

    fn sample_event() -> ResourceRequestEvent {
        ResourceRequestEvent {
            event_type: stampede_core::publish::EVENT_TYPE.to_string(),
            resource_id: 42,
            user_id: "user-a".to_string(),
            name: "basic-instance".to_string(),
            shape: ResourceShape {
                cpus: 2,
                memory_mb: 4096,
                gpus: 0,
                image: "ubuntu:22.04".to_string(),
            },
            config_json: br#"{"disk_gb":20}"#.to_vec(),
            emitted_at: Utc::now(),
        }
    }

    #[test]
    fn publishers_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KafkaResourcePublisher>();
        assert_send_sync::<NoopResourcePublisher>();
    }

    #[test]
    fn builder_rejects_missing_brokers() {
        assert!(KafkaResourcePublisher::builder().topic("t").build().is_err());
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails if degraded publish errors
    async fn noop_accepts_events_immediately() {
        let publisher = NoopResourcePublisher::new();
        publisher
            .publish(&sample_event())
            .await
            .expect("degraded publish always succeeds");
    }
}
