//! Downstream provisioning event contract.
//!
//! One [`ResourceRequestEvent`] is produced per successfully committed
//! order. Delivery to the broker is at-least-once at best; the
//! provisioning domain dedupes on `resource_id` if it observes
//! duplicates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event-type tag carried in the wire payload.
pub const EVENT_TYPE: &str = "InstanceCreated.v1";

/// Fixed routing token for provisioning requests.
pub const ROUTING_KEY: &str = "instance.created";

/// Errors from publisher implementations.
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    /// Transport-level send failure; retryable by the caller.
    #[error("publish failed: {0}")]
    Failed(String),

    /// The event could not be serialized.
    #[error("event serialization failed: {0}")]
    Serialization(String),
}

/// Resource shape requested from the provisioning domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceShape {
    /// CPU core count.
    pub cpus: i32,
    /// Memory size in MiB.
    pub memory_mb: i32,
    /// Accelerator count.
    pub gpus: i32,
    /// Base image reference.
    pub image: String,
}

/// The outbound message to the provisioning domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequestEvent {
    /// Event-type tag ([`EVENT_TYPE`]).
    pub event_type: String,
    /// Minted resource identifier; the provisioning domain's
    /// idempotency key.
    pub resource_id: i64,
    /// Opaque user identifier.
    pub user_id: String,
    /// Resource name, taken from the product name.
    pub name: String,
    /// Requested resource shape.
    pub shape: ResourceShape,
    /// Free-form extension payload (raw JSON bytes).
    pub config_json: Vec<u8>,
    /// Emission timestamp.
    pub emitted_at: DateTime<Utc>,
}

impl ResourceRequestEvent {
    /// Serialize to the compact binary wire form.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Serialization`] if encoding fails
    /// (rare with bincode).
    pub fn to_bytes(&self) -> Result<Vec<u8>, PublishError> {
        bincode::serialize(self).map_err(|e| PublishError::Serialization(e.to_string()))
    }

    /// Decode from the binary wire form.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Serialization`] if the bytes do not
    /// decode.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PublishError> {
        bincode::deserialize(bytes).map_err(|e| PublishError::Serialization(e.to_string()))
    }
}

/// Delivers provisioning events downstream.
///
/// Two implementations exist, selected at construction time: the real
/// broker-backed publisher, and a degraded no-op used when the broker
/// is unreachable at startup. The no-op accepts every call, logs a
/// warning, and returns `Ok` so the commit path never cascades into
/// total unavailability.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event with durable delivery semantics.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Failed`] on transport failure; the
    /// caller treats this as retryable and leaves the triggering log
    /// entry unacknowledged.
    async fn publish(&self, event: &ResourceRequestEvent) -> Result<(), PublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::expect_used)] // Panics: test fails if serialization fails
    fn wire_roundtrip_preserves_event() {
        let event = ResourceRequestEvent {
            event_type: EVENT_TYPE.to_string(),
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
        };

        let bytes = event.to_bytes().expect("serialize");
        let decoded = ResourceRequestEvent::from_bytes(&bytes).expect("deserialize");
        assert_eq!(event, decoded);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(ResourceRequestEvent::from_bytes(&[0xFF, 0x01, 0x02]).is_err());
    }
}
