//! Redis Streams consumer-group event log.

use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client};
use stampede_core::{EntryId, EventLog, LogEntry, LogError};
use tracing::{debug, info, warn};

/// Default stream key shared with the edge tier that enqueues
/// purchases.
pub const DEFAULT_STREAM: &str = "stream:orders";

/// Default consumer group name.
pub const DEFAULT_GROUP: &str = "g1";

/// Scan cursor position that restarts an `XAUTOCLAIM` pass from the
/// beginning of the pending entries list.
const CURSOR_START: &str = "0-0";

/// [`EventLog`] over one Redis Stream and consumer group.
///
/// # Thread Safety
///
/// Shared behind an `Arc` across the claim and reclaim loops; all
/// commands multiplex over one [`ConnectionManager`]. The `XAUTOCLAIM`
/// scan cursor is shared too, so concurrent reclaim sweeps make one
/// combined pass instead of re-scanning the same range.
pub struct RedisEventLog {
    conn_manager: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
    /// Position of the next `XAUTOCLAIM` sweep; `0-0` restarts a pass.
    reclaim_cursor: Mutex<String>,
}

impl RedisEventLog {
    /// Connect to Redis and bind to one stream/group/consumer triple.
    ///
    /// The consumer name must be stable per process so entries claimed
    /// before a crash stay attributed to it and become reclaimable
    /// once idle.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Unavailable`] if the URL is malformed or
    /// the connection cannot be established.
    pub async fn connect(
        redis_url: &str,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self, LogError> {
        let client = Client::open(redis_url)
            .map_err(|e| LogError::Unavailable(format!("failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            LogError::Unavailable(format!("failed to create Redis connection manager: {e}"))
        })?;
        Ok(Self::with_manager(conn_manager, stream, group, consumer))
    }

    /// Build over an existing [`ConnectionManager`].
    pub fn with_manager(
        conn_manager: ConnectionManager,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            conn_manager,
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
            reclaim_cursor: Mutex::new(CURSOR_START.to_string()),
        }
    }

    /// Convert one raw stream record into a [`LogEntry`].
    ///
    /// Non-string field values are skipped rather than failing the
    /// whole batch; the ingestor treats the resulting missing field as
    /// a malformed entry and acks it away.
    fn to_entry(raw: &StreamId) -> Result<LogEntry, LogError> {
        let id = EntryId::from_str(&raw.id)?;
        let fields = raw
            .map
            .iter()
            .filter_map(|(k, v)| {
                let value: Option<String> = redis::from_redis_value(v).ok();
                value.map(|v| (k.clone(), v))
            })
            .collect();
        Ok(LogEntry { id, fields })
    }

    fn collect_entries<'a>(
        &self,
        raw: impl Iterator<Item = &'a StreamId>,
    ) -> Vec<LogEntry> {
        raw.filter_map(|record| match Self::to_entry(record) {
            Ok(entry) => Some(entry),
            Err(e) => {
                // Should never happen: Redis only hands out well-formed
                // <ms>-<seq> identifiers.
                warn!(stream = %self.stream, error = %e, "skipping record with unparseable id");
                None
            }
        })
        .collect()
    }

    fn take_cursor(&self) -> String {
        match self.reclaim_cursor.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_cursor(&self, next: String) {
        match self.reclaim_cursor.lock() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

#[async_trait]
impl EventLog for RedisEventLog {
    async fn ensure_group(&self) -> Result<(), LogError> {
        let mut conn = self.conn_manager.clone();
        let created: Result<String, redis::RedisError> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "0")
            .await;
        match created {
            Ok(_) => {
                info!(stream = %self.stream, group = %self.group, "consumer group created");
                Ok(())
            }
            // Idempotent: the group surviving a previous run is fine.
            Err(e) if e.code() == Some("BUSYGROUP") => {
                info!(stream = %self.stream, group = %self.group, "consumer group already exists");
                Ok(())
            }
            Err(e) => Err(LogError::Unavailable(format!(
                "failed to create consumer group: {e}"
            ))),
        }
    }

    async fn read_batch(&self, count: usize, block: Duration) -> Result<Vec<LogEntry>, LogError> {
        let mut conn = self.conn_manager.clone();
        let block_ms = usize::try_from(block.as_millis()).unwrap_or(usize::MAX);
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(count)
            .block(block_ms);

        // A nil reply is the normal outcome of a bounded wait with no
        // new entries.
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.stream], &[">"], &options)
            .await
            .map_err(|e| LogError::Unavailable(format!("XREADGROUP failed: {e}")))?;

        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let entries =
            self.collect_entries(reply.keys.iter().flat_map(|stream| stream.ids.iter()));
        if !entries.is_empty() {
            debug!(stream = %self.stream, claimed = entries.len(), "claimed batch");
            metrics::counter!("stampede.log.claimed").increment(entries.len() as u64);
        }
        Ok(entries)
    }

    async fn ack(&self, id: &EntryId) -> Result<(), LogError> {
        let mut conn = self.conn_manager.clone();
        let _: i64 = conn
            .xack(&self.stream, &self.group, &[id.to_string()])
            .await
            .map_err(|e| LogError::Unavailable(format!("XACK failed: {e}")))?;
        Ok(())
    }

    async fn reclaim(&self, min_idle: Duration, count: usize) -> Result<Vec<LogEntry>, LogError> {
        let cursor = self.take_cursor();
        let min_idle_ms = u64::try_from(min_idle.as_millis()).unwrap_or(u64::MAX);
        let options = StreamAutoClaimOptions::default().count(count);

        let mut conn = self.conn_manager.clone();
        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                &self.stream,
                &self.group,
                &self.consumer,
                min_idle_ms,
                &cursor,
                options,
            )
            .await
            .map_err(|e| LogError::Unavailable(format!("XAUTOCLAIM failed: {e}")))?;

        // An empty sweep means the pass is complete; restart from the
        // top next time so newly idle entries are picked up.
        let next = if reply.claimed.is_empty() {
            CURSOR_START.to_string()
        } else {
            reply.next_stream_id.clone()
        };
        self.store_cursor(next);

        let entries = self.collect_entries(reply.claimed.iter());
        if !entries.is_empty() {
            info!(stream = %self.stream, reclaimed = entries.len(), "reclaimed idle entries");
            metrics::counter!("stampede.log.reclaimed").increment(entries.len() as u64);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::Value;
    use std::collections::HashMap;

    #[test]
    fn redis_event_log_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RedisEventLog>();
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: test fails if conversion fails
    fn to_entry_extracts_string_fields() {
        let raw = StreamId {
            id: "1700000000000-2".to_string(),
            map: HashMap::from([(
                "uid".to_string(),
                Value::BulkString(b"user-42".to_vec()),
            )]),
        };
        let entry = RedisEventLog::to_entry(&raw).expect("well-formed record");
        assert_eq!(entry.id, EntryId { ms: 1_700_000_000_000, seq: 2 });
        assert_eq!(entry.user_id(), Some("user-42"));
    }

    #[test]
    fn to_entry_rejects_malformed_id() {
        let raw = StreamId {
            id: "not-an-id".to_string(),
            map: HashMap::new(),
        };
        assert!(matches!(
            RedisEventLog::to_entry(&raw),
            Err(LogError::MalformedId(_))
        ));
    }
}
