//! Consumer-group stream ingestion.
//!
//! [`StreamIngestor`] drives the pipeline: a claim loop blocking-reads
//! batches of new entries assigned to this consumer and a reclaim loop
//! periodically sweeps entries stuck on crashed or slow consumers
//! anywhere in the group. Both dispatch through the same
//! commit-then-ack path.
//!
//! # Acknowledgement rules
//!
//! - Commit succeeded (including duplicates folded by the committer):
//!   acknowledge.
//! - Malformed entry (missing `uid`): acknowledge and drop; retrying
//!   a malformed entry can never succeed.
//! - Permanent commit error (unknown/disabled product, missing spec):
//!   acknowledge and drop, for the same reason.
//! - Retryable commit error: leave unacknowledged; the reclaim sweep
//!   redelivers it after the idle threshold.
//!
//! No ordering is guaranteed across entries; per-entry idempotency in
//! the committer makes redelivery and out-of-order reclaim safe.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start──► Consuming ──shutdown──► Draining ──join──► Stopped
//! ```
//!
//! Shutdown cancels both loops, lets in-flight commits finish, and
//! bounds the join with a deadline. Exceeding the deadline is reported
//! as an error but does not kill in-flight commits; they may still
//! acknowledge afterwards, which is safe because acknowledgement is
//! idempotent.

use crate::committer::PurchaseCommitter;
use crate::log::{EntryId, EventLog, LogEntry, LogError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Errors from ingestor lifecycle operations.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The event log rejected a setup command.
    #[error(transparent)]
    Log(#[from] LogError),

    /// The shutdown deadline elapsed before both loops joined.
    #[error("shutdown deadline exceeded after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Observable ingestor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestorState {
    /// Constructed, not yet started.
    Idle,
    /// Claim and reclaim loops running.
    Consuming,
    /// Cancellation signalled; loops finishing in-flight work.
    Draining,
    /// All loops joined.
    Stopped,
}

/// Tuning knobs for one monitored stream.
#[derive(Debug, Clone)]
pub struct IngestorConfig {
    /// Product the monitored flash sale is selling.
    pub product_id: i64,
    /// Maximum entries per claim batch.
    pub batch_size: usize,
    /// Bounded wait of the blocking stream read.
    pub block_timeout: Duration,
    /// Period of the reclaim sweep.
    pub reclaim_interval: Duration,
    /// Pending-idle threshold before an entry is reclaimed from its
    /// original consumer.
    pub reclaim_idle: Duration,
}

impl IngestorConfig {
    /// Defaults matching production tuning: batches of 128, 2s
    /// blocking reads, 2s reclaim period, 10s idle threshold.
    #[must_use]
    pub const fn new(product_id: i64) -> Self {
        Self {
            product_id,
            batch_size: 128,
            block_timeout: Duration::from_secs(2),
            reclaim_interval: Duration::from_secs(2),
            reclaim_idle: Duration::from_secs(10),
        }
    }
}

/// Consumer-group reader over one partitioned stream.
pub struct StreamIngestor {
    log: Arc<dyn EventLog>,
    committer: Arc<PurchaseCommitter>,
    config: IngestorConfig,
}

impl StreamIngestor {
    /// Create an ingestor over the given log and committer.
    #[must_use]
    pub fn new(
        log: Arc<dyn EventLog>,
        committer: Arc<PurchaseCommitter>,
        config: IngestorConfig,
    ) -> Self {
        Self {
            log,
            committer,
            config,
        }
    }

    /// Current lifecycle state. Always [`IngestorState::Idle`] before
    /// [`start`](Self::start); observe the running states through
    /// [`IngestorHandle::state`].
    #[must_use]
    pub const fn state(&self) -> IngestorState {
        IngestorState::Idle
    }

    /// Ensure the consumer group exists and spawn both loops.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Log`] if group creation fails for any
    /// reason other than the group already existing.
    pub async fn start(self) -> Result<IngestorHandle, IngestError> {
        self.log.ensure_group().await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, _) = watch::channel(IngestorState::Consuming);

        let claim = tokio::spawn(claim_loop(
            Arc::clone(&self.log),
            Arc::clone(&self.committer),
            self.config.clone(),
            shutdown_rx.clone(),
        ));
        let reclaim = tokio::spawn(reclaim_loop(
            Arc::clone(&self.log),
            Arc::clone(&self.committer),
            self.config.clone(),
            shutdown_rx,
        ));

        info!(
            product_id = self.config.product_id,
            batch_size = self.config.batch_size,
            reclaim_idle_ms = u64::try_from(self.config.reclaim_idle.as_millis()).unwrap_or(u64::MAX),
            "stream ingestor started"
        );

        Ok(IngestorHandle {
            shutdown: shutdown_tx,
            state: state_tx,
            tasks: vec![claim, reclaim],
        })
    }
}

/// Running ingestor: state observation and bounded shutdown.
pub struct IngestorHandle {
    shutdown: watch::Sender<bool>,
    state: watch::Sender<IngestorState>,
    tasks: Vec<JoinHandle<()>>,
}

impl IngestorHandle {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> IngestorState {
        *self.state.borrow()
    }

    /// Signal cancellation and wait for both loops to join, bounded by
    /// `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::ShutdownTimeout`] when the deadline
    /// elapses first. In-flight commits are not killed and may still
    /// acknowledge after the deadline.
    pub async fn shutdown(mut self, deadline: Duration) -> Result<(), IngestError> {
        let _ = self.shutdown.send(true);
        self.state.send_replace(IngestorState::Draining);

        let tasks = std::mem::take(&mut self.tasks);
        let join_all = async {
            for task in tasks {
                if let Err(e) = task.await {
                    error!(error = %e, "ingestor loop panicked");
                }
            }
        };

        match tokio::time::timeout(deadline, join_all).await {
            Ok(()) => {
                self.state.send_replace(IngestorState::Stopped);
                info!("stream ingestor stopped");
                Ok(())
            }
            Err(_) => Err(IngestError::ShutdownTimeout(deadline)),
        }
    }
}

async fn claim_loop(
    log: Arc<dyn EventLog>,
    committer: Arc<PurchaseCommitter>,
    config: IngestorConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("claim loop draining");
                break;
            }
            batch = log.read_batch(config.batch_size, config.block_timeout) => match batch {
                Ok(entries) => {
                    for entry in entries {
                        process_entry(&log, &committer, config.product_id, &entry).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "stream read failed");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            }
        }
    }
}

async fn reclaim_loop(
    log: Arc<dyn EventLog>,
    committer: Arc<PurchaseCommitter>,
    config: IngestorConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.reclaim_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("reclaim loop draining");
                break;
            }
            _ = ticker.tick() => {
                match log.reclaim(config.reclaim_idle, config.batch_size).await {
                    Ok(entries) => {
                        if !entries.is_empty() {
                            debug!(count = entries.len(), "reclaimed stuck entries");
                        }
                        for entry in entries {
                            process_entry(&log, &committer, config.product_id, &entry).await;
                        }
                    }
                    Err(e) => error!(error = %e, "reclaim sweep failed"),
                }
            }
        }
    }
}

/// The single commit-then-ack path shared by both loops.
async fn process_entry(
    log: &Arc<dyn EventLog>,
    committer: &PurchaseCommitter,
    product_id: i64,
    entry: &LogEntry,
) {
    let Some(user_id) = entry.user_id() else {
        warn!(entry = %entry.id, "entry missing uid field, dropping");
        metrics::counter!("stampede.ingest.malformed").increment(1);
        ack_entry(log, &entry.id).await;
        return;
    };

    let request_seq = entry.id.request_seq();
    match committer.commit(product_id, user_id, request_seq).await {
        Ok(committed) => {
            debug!(
                entry = %entry.id,
                order_id = committed.order_id,
                "entry committed"
            );
            metrics::counter!("stampede.ingest.committed").increment(1);
            ack_entry(log, &entry.id).await;
        }
        Err(e) if e.is_retryable() => {
            // Leave unacknowledged; the reclaim sweep will retry.
            error!(entry = %entry.id, error = %e, "commit failed, leaving entry pending");
            metrics::counter!("stampede.ingest.retryable").increment(1);
        }
        Err(e) => {
            warn!(entry = %entry.id, error = %e, "permanent commit failure, dropping entry");
            metrics::counter!("stampede.ingest.dropped").increment(1);
            ack_entry(log, &entry.id).await;
        }
    }
}

async fn ack_entry(log: &Arc<dyn EventLog>, id: &EntryId) {
    if let Err(e) = log.ack(id).await {
        // The entry stays pending and will be reprocessed; safe
        // because the commit is idempotent.
        error!(entry = %id, error = %e, "ack failed, entry will be redelivered");
    }
}
