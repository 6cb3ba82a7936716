//! Order persistence contract.
//!
//! The store enforces the pipeline's one hard invariant: a uniqueness
//! constraint over `(product_id, request_seq)`. Everything upstream
//! treats a violation of that constraint as "this purchase was already
//! committed", not as a failure.

use crate::order::{Order, OrderStatus};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from order store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The uniqueness constraint over `(product_id, request_seq)`
    /// fired. Deliberate signal, folded into success by the committer.
    #[error("duplicate request: product {product_id} request_seq {request_seq}")]
    DuplicateRequest {
        /// Product half of the uniqueness key.
        product_id: i64,
        /// Sequence half of the uniqueness key.
        request_seq: i64,
    },

    /// No order matched the lookup.
    #[error("order not found")]
    NotFound,

    /// Status update rejected by the monotonic transition rule.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: OrderStatus,
        /// Rejected target status.
        to: OrderStatus,
    },

    /// The store could not be reached or the query failed; retryable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A row failed to decode into the domain model.
    #[error("corrupt order row: {0}")]
    Corrupt(String),
}

/// Durable order storage.
///
/// Implementations must make `create` atomic with respect to the
/// uniqueness constraint: concurrent creates for the same
/// `(product_id, request_seq)` must yield exactly one row and
/// [`StoreError::DuplicateRequest`] for the losers.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order row.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateRequest`] when `(product_id,
    /// request_seq)` already exists; [`StoreError::Unavailable`] on
    /// transport failure.
    async fn create(&self, order: &Order) -> Result<(), StoreError>;

    /// Fetch an order by its ID.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when absent.
    async fn get(&self, order_id: i64) -> Result<Order, StoreError>;

    /// Fetch an order by its uniqueness key.
    ///
    /// This is the read-after-conflict half of the idempotent commit
    /// contract.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when absent.
    async fn get_by_request(&self, product_id: i64, request_seq: i64)
    -> Result<Order, StoreError>;

    /// Advance an order's status, stamping `completed_at` on
    /// completion.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidTransition`] when the monotonic rule
    /// rejects the change; [`StoreError::NotFound`] when the order
    /// does not exist.
    async fn update_status(&self, order_id: i64, status: OrderStatus) -> Result<(), StoreError>;
}
