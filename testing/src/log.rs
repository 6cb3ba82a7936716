//! In-memory event log with consumer-group semantics.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use stampede_core::{EntryId, EventLog, LogEntry, LogError, USER_ID_FIELD};

struct Pending {
    entry: LogEntry,
    claimed_at: Instant,
}

#[derive(Default)]
struct State {
    undelivered: Vec<LogEntry>,
    pending: Vec<Pending>,
    acked: Vec<EntryId>,
    next_ms: u64,
}

/// [`EventLog`] over vectors, modelling delivery state the way a
/// consumer group does: appended entries are delivered once by
/// `read_batch`, sit pending until acknowledged, and become
/// reclaimable after the idle threshold.
#[derive(Default)]
pub struct InMemoryEventLog {
    state: Mutex<State>,
}

impl InMemoryEventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry with the given user id; returns its entry id.
    pub fn append(&self, uid: &str) -> EntryId {
        self.append_fields(HashMap::from([(
            USER_ID_FIELD.to_string(),
            uid.to_string(),
        )]))
    }

    /// Append an entry with arbitrary fields (e.g. a missing `uid`);
    /// returns its entry id.
    pub fn append_fields(&self, fields: HashMap<String, String>) -> EntryId {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.next_ms += 1;
        let id = EntryId {
            ms: state.next_ms,
            seq: 0,
        };
        state.undelivered.push(LogEntry { id, fields });
        id
    }

    /// Whether the entry has been acknowledged.
    #[must_use]
    pub fn is_acked(&self, id: EntryId) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .acked
            .contains(&id)
    }

    /// Number of entries delivered but not yet acknowledged.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn ensure_group(&self) -> Result<(), LogError> {
        Ok(())
    }

    async fn read_batch(&self, count: usize, block: Duration) -> Result<Vec<LogEntry>, LogError> {
        let batch: Vec<LogEntry> = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let take = count.min(state.undelivered.len());
            let batch: Vec<LogEntry> = state.undelivered.drain(..take).collect();
            let now = Instant::now();
            for entry in &batch {
                state.pending.push(Pending {
                    entry: entry.clone(),
                    claimed_at: now,
                });
            }
            batch
        };

        // Honor the bounded wait so callers polling an empty log do
        // not spin.
        if batch.is_empty() {
            tokio::time::sleep(block).await;
        }
        Ok(batch)
    }

    async fn ack(&self, id: &EntryId) -> Result<(), LogError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending.retain(|p| p.entry.id != *id);
        if !state.acked.contains(id) {
            state.acked.push(*id);
        }
        Ok(())
    }

    async fn reclaim(&self, min_idle: Duration, count: usize) -> Result<Vec<LogEntry>, LogError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let mut claimed = Vec::new();
        for pending in &mut state.pending {
            if claimed.len() == count {
                break;
            }
            if now.duration_since(pending.claimed_at) >= min_idle {
                pending.claimed_at = now;
                claimed.push(pending.entry.clone());
            }
        }
        Ok(claimed)
    }
}
