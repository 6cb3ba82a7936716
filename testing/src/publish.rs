//! Recording publisher with injectable failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use stampede_core::publish::{EventPublisher, PublishError, ResourceRequestEvent};

/// [`EventPublisher`] that records every accepted event and can be
/// armed to fail the next N sends.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<ResourceRequestEvent>>,
    fail_remaining: AtomicUsize,
}

impl RecordingPublisher {
    /// Create a publisher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` publish calls with
    /// [`PublishError::Failed`], then accept again.
    pub fn fail_next(&self, count: usize) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Events accepted so far, in publish order.
    #[must_use]
    pub fn events(&self) -> Vec<ResourceRequestEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of events accepted so far.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &ResourceRequestEvent) -> Result<(), PublishError> {
        let armed = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if armed.is_ok() {
            return Err(PublishError::Failed("injected send failure".to_string()));
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
