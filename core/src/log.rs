//! Append-only event log contract.
//!
//! The underlying store (Redis Streams in production) owns partition
//! cursors and per-entry acknowledgement state; the core only issues
//! claim/ack/reclaim operations through [`EventLog`] and never
//! inspects cursor internals.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Field carrying the user ID in a log entry.
pub const USER_ID_FIELD: &str = "uid";

/// Errors from event log implementations.
#[derive(Error, Debug)]
pub enum LogError {
    /// The log store could not be reached or a command failed;
    /// retryable.
    #[error("event log unavailable: {0}")]
    Unavailable(String),

    /// An entry ID token did not parse as `<ms>-<seq>`.
    #[error("malformed entry id: {0:?}")]
    MalformedId(String),
}

/// Log-assigned entry identifier: a two-part `<ms>-<seq>` token,
/// monotonic within a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId {
    /// Millisecond half of the token.
    pub ms: u64,
    /// Sequence half of the token.
    pub seq: u64,
}

impl EntryId {
    /// Derive a deterministic request sequence from this entry's
    /// token.
    ///
    /// The same entry always maps to the same sequence, so redelivery
    /// of one log entry folds into one order via the storage
    /// uniqueness constraint. Classic 31-multiplier string hash over
    /// the token, absolute value.
    #[must_use]
    pub fn request_seq(&self) -> i64 {
        let token = self.to_string();
        let mut hash: i64 = 0;
        for b in token.bytes() {
            hash = hash.wrapping_mul(31).wrapping_add(i64::from(b));
        }
        if hash == i64::MIN {
            0
        } else {
            hash.abs()
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || LogError::MalformedId(s.to_string());
        let (ms, seq) = s.split_once('-').ok_or_else(malformed)?;
        Ok(Self {
            ms: ms.parse().map_err(|_| malformed())?,
            seq: seq.parse().map_err(|_| malformed())?,
        })
    }
}

/// One immutable record claimed from the log.
///
/// Consumed at-least-once; never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Log-assigned identifier.
    pub id: EntryId,
    /// Entry field map.
    pub fields: HashMap<String, String>,
}

impl LogEntry {
    /// The entry's user ID, if present and non-empty.
    ///
    /// Entries without one are malformed and are dropped by the
    /// ingestor: retrying them can never succeed.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.fields
            .get(USER_ID_FIELD)
            .map(String::as_str)
            .filter(|uid| !uid.is_empty())
    }
}

/// Consumer-group access to one partitioned append-only log.
///
/// Implementations are shared across the claim and reclaim loops of
/// one [`StreamIngestor`](crate::StreamIngestor).
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Create the consumer group if it does not exist.
    ///
    /// A "group already exists" response from the store is success,
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Unavailable`] if the store rejects the
    /// command for any other reason.
    async fn ensure_group(&self) -> Result<(), LogError>;

    /// Claim up to `count` new entries for this consumer, blocking up
    /// to `block` when none are available.
    ///
    /// An empty result after the bounded wait is normal.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Unavailable`] on read failure.
    async fn read_batch(&self, count: usize, block: Duration) -> Result<Vec<LogEntry>, LogError>;

    /// Acknowledge one entry as processed.
    ///
    /// Acknowledgement is idempotent: re-acking an already-acked entry
    /// is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Unavailable`] on failure; the entry stays
    /// pending and will be swept by reclaim.
    async fn ack(&self, id: &EntryId) -> Result<(), LogError>;

    /// Claim entries pending longer than `min_idle` from any consumer
    /// in the group, including crashed siblings.
    ///
    /// Implementations keep an internal scan cursor and reset it after
    /// a full pass.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Unavailable`] on failure.
    async fn reclaim(&self, min_idle: Duration, count: usize) -> Result<Vec<LogEntry>, LogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::expect_used)] // Panics: test fails if parsing fails
    fn entry_id_parses_and_displays() {
        let id: EntryId = "1609459200000-3".parse().expect("valid token");
        assert_eq!(id.ms, 1_609_459_200_000);
        assert_eq!(id.seq, 3);
        assert_eq!(id.to_string(), "1609459200000-3");
    }

    #[test]
    fn entry_id_rejects_malformed_tokens() {
        for bad in ["", "123", "a-b", "1-2-3", "12-"] {
            assert!(bad.parse::<EntryId>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn entry_ids_order_by_ms_then_seq() {
        let a = EntryId { ms: 1, seq: 9 };
        let b = EntryId { ms: 2, seq: 0 };
        let c = EntryId { ms: 2, seq: 1 };
        assert!(a < b && b < c);
    }

    #[test]
    fn request_seq_is_deterministic_and_non_negative() {
        let id = EntryId { ms: 1_609_459_200_000, seq: 0 };
        let seq = id.request_seq();
        assert!(seq >= 0);
        assert_eq!(seq, id.request_seq());
        // Distinct tokens should not collide on such short inputs.
        let other = EntryId { ms: 1_609_459_200_000, seq: 1 };
        assert_ne!(seq, other.request_seq());
    }

    #[test]
    fn user_id_rejects_missing_and_empty() {
        let mut entry = LogEntry {
            id: EntryId { ms: 1, seq: 0 },
            fields: HashMap::new(),
        };
        assert_eq!(entry.user_id(), None);

        entry.fields.insert(USER_ID_FIELD.to_string(), String::new());
        assert_eq!(entry.user_id(), None);

        entry
            .fields
            .insert(USER_ID_FIELD.to_string(), "user-a".to_string());
        assert_eq!(entry.user_id(), Some("user-a"));
    }
}
