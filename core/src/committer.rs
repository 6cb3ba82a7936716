//! Idempotent purchase commit orchestration.
//!
//! [`PurchaseCommitter`] is the unit that turns one logical purchase
//! into exactly one order row and one provisioning request: it mints
//! identifiers, resolves the catalog snapshot, persists the order, and
//! publishes the downstream event.
//!
//! # Idempotency
//!
//! The storage uniqueness constraint over `(product_id, request_seq)`
//! is the sole idempotency mechanism. When it fires, the commit is
//! folded into the previously committed order: the existing
//! identifiers are read back and returned as success, and no second
//! event is published. Duplicate deliveries of one logical purchase
//! therefore produce one row and one event.
//!
//! # Failure semantics
//!
//! Permanent errors (unknown/disabled product, missing spec) must not
//! be retried: resubmitting the same input can never succeed. Publish
//! failure after the row is committed is retryable; the row is not
//! rolled back, because at-least-once delivery of the downstream event
//! is preferred over losing the order.

use crate::catalog::{CatalogError, ProductCatalog, ProductStatus};
use crate::ids::IdMinter;
use crate::order::{Order, OrderStatus};
use crate::publish::{EVENT_TYPE, EventPublisher, PublishError, ResourceRequestEvent, ResourceShape};
use crate::store::{OrderStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Identifiers of a committed purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Committed {
    /// Order identifier (minted, or read back on duplicate).
    pub order_id: i64,
    /// Resource identifier handed to the provisioning domain.
    pub resource_id: i64,
}

/// Errors from [`PurchaseCommitter::commit`].
///
/// The taxonomy drives retry policy: permanent variants are dropped by
/// the stream path and rejected on the direct path; retryable variants
/// leave the triggering log entry unacknowledged.
#[derive(Error, Debug)]
pub enum CommitError {
    /// No such product. Permanent.
    #[error("product {0} not found")]
    ProductNotFound(i64),

    /// Product exists but is not sellable. Permanent.
    #[error("product {0} is disabled")]
    ProductDisabled(i64),

    /// Enabled product without a resource specification: a
    /// data-integrity bug, never expected. Permanent.
    #[error("product {0} has no resource specification")]
    InvalidCatalogEntry(i64),

    /// Catalog lookup transport failure. Retryable.
    #[error("catalog lookup failed: {0}")]
    Catalog(#[source] CatalogError),

    /// Order store failure. Retryable.
    #[error("order store failed: {0}")]
    Store(#[source] StoreError),

    /// Downstream publish failure; the order row is already committed
    /// and will be folded on retry. Retryable.
    #[error("event publish failed: {0}")]
    Publish(#[source] PublishError),
}

impl CommitError {
    /// Whether the caller should retry the same input.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Catalog(_) | Self::Store(_) | Self::Publish(_))
    }
}

/// Orchestrates the idempotent purchase commit.
///
/// Collaborators are injected as handles at construction; there are no
/// process-wide singletons.
pub struct PurchaseCommitter {
    catalog: Arc<dyn ProductCatalog>,
    store: Arc<dyn OrderStore>,
    publisher: Arc<dyn EventPublisher>,
    minter: Arc<IdMinter>,
}

impl PurchaseCommitter {
    /// Create a committer over the given collaborators.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        store: Arc<dyn OrderStore>,
        publisher: Arc<dyn EventPublisher>,
        minter: Arc<IdMinter>,
    ) -> Self {
        Self {
            catalog,
            store,
            publisher,
            minter,
        }
    }

    /// Commit one logical purchase.
    ///
    /// `request_seq == 0` is the regular-purchase path: a sequence is
    /// minted locally from `user_id`. Non-zero sequences come from the
    /// flash-sale admission step.
    ///
    /// Calling twice with the same `(product_id, request_seq)` yields
    /// the same identifiers and exactly one order row.
    ///
    /// # Errors
    ///
    /// See [`CommitError`]; use
    /// [`is_retryable`](CommitError::is_retryable) to distinguish
    /// permanent rejections from transient failures worth retrying.
    pub async fn commit(
        &self,
        product_id: i64,
        user_id: &str,
        request_seq: i64,
    ) -> Result<Committed, CommitError> {
        let request_seq = if request_seq == 0 {
            let minted = self.minter.mint(user_id);
            debug!(request_seq = minted, "minted local request sequence");
            minted
        } else {
            request_seq
        };

        let product = self
            .catalog
            .get(product_id)
            .await
            .map_err(CommitError::Catalog)?
            .ok_or(CommitError::ProductNotFound(product_id))?;

        if product.status != ProductStatus::Enabled {
            return Err(CommitError::ProductDisabled(product_id));
        }
        let Some(spec) = product.spec.as_ref() else {
            // Should never happen for an enabled product.
            return Err(CommitError::InvalidCatalogEntry(product_id));
        };

        let order_id = self.minter.mint(user_id);
        let resource_id = self.minter.mint(user_id);

        let now = Utc::now();
        let order = Order {
            order_id,
            user_id: user_id.to_string(),
            product_id,
            request_seq,
            amount: product.price,
            resource_id,
            status: OrderStatus::Paid,
            created_at: now,
            paid_at: Some(now),
            completed_at: None,
        };

        match self.store.create(&order).await {
            Ok(()) => {}
            Err(StoreError::DuplicateRequest { .. }) => {
                // Already committed by an earlier delivery. Read back
                // the original identifiers and fold into success; the
                // event was published (or is being retried) by the
                // winning delivery, so no second publish here.
                let existing = self
                    .store
                    .get_by_request(product_id, request_seq)
                    .await
                    .map_err(CommitError::Store)?;
                info!(
                    product_id,
                    request_seq,
                    order_id = existing.order_id,
                    "duplicate purchase folded into existing order"
                );
                metrics::counter!("stampede.commit.duplicate").increment(1);
                return Ok(Committed {
                    order_id: existing.order_id,
                    resource_id: existing.resource_id,
                });
            }
            Err(e) => return Err(CommitError::Store(e)),
        }

        let event = ResourceRequestEvent {
            event_type: EVENT_TYPE.to_string(),
            resource_id,
            user_id: user_id.to_string(),
            name: product.name.clone(),
            shape: ResourceShape {
                cpus: spec.cpus,
                memory_mb: spec.memory_mb,
                gpus: spec.gpus,
                image: spec.image.clone(),
            },
            config_json: spec.config_json.clone(),
            emitted_at: Utc::now(),
        };

        if let Err(e) = self.publisher.publish(&event).await {
            // The row stays: losing the order is worse than a
            // duplicate provisioning request.
            warn!(
                order_id,
                resource_id,
                error = %e,
                "order committed but event publish failed; caller should retry"
            );
            metrics::counter!("stampede.commit.publish_failed").increment(1);
            return Err(CommitError::Publish(e));
        }

        info!(order_id, resource_id, product_id, request_seq, "purchase committed");
        metrics::counter!("stampede.commit.committed").increment(1);
        Ok(Committed {
            order_id,
            resource_id,
        })
    }
}
