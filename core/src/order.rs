//! The Order aggregate.
//!
//! Orders are only ever created after payment confirmation, so there
//! is no PENDING state: a row is born `PAID` and advances monotonically
//! to `COMPLETED` (provisioning succeeded) or `CANCELLED`. Rows are
//! never deleted and, apart from status/timestamp transitions, never
//! mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an [`Order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Payment confirmed, provisioning requested.
    Paid,
    /// Terminal: order was cancelled.
    Cancelled,
    /// Terminal: provisioning succeeded.
    Completed,
}

impl OrderStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PAID" => Some(Self::Paid),
            "CANCELLED" => Some(Self::Cancelled),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Whether the status may advance to `next`.
    ///
    /// Transitions are monotone: `PAID → COMPLETED` and
    /// `PAID → CANCELLED` only. Terminal states never regress.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Paid, Self::Completed) | (Self::Paid, Self::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The order aggregate written by the purchase committer.
///
/// The pair `(product_id, request_seq)` is unique across all orders;
/// that constraint is the sole idempotency mechanism of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Minted order identifier.
    pub order_id: i64,
    /// Opaque user identifier from the admission step.
    pub user_id: String,
    /// Product this order was placed for.
    pub product_id: i64,
    /// Per-product request sequence; forms the uniqueness key with
    /// `product_id`.
    pub request_seq: i64,
    /// Amount in minor currency units, snapshotted from the catalog.
    pub amount: i64,
    /// Minted resource identifier, set at creation.
    pub resource_id: i64,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Payment time; equals `created_at` since orders are created
    /// post-payment.
    pub paid_at: Option<DateTime<Utc>>,
    /// Set when the provisioning callback marks the order completed.
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_db_strings() {
        for status in [OrderStatus::Paid, OrderStatus::Cancelled, OrderStatus::Completed] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("PENDING"), None);
    }

    #[test]
    fn transitions_are_monotone() {
        use OrderStatus::{Cancelled, Completed, Paid};
        assert!(Paid.can_transition_to(Completed));
        assert!(Paid.can_transition_to(Cancelled));
        // No regression out of terminal states, no self-transitions.
        assert!(!Completed.can_transition_to(Paid));
        assert!(!Cancelled.can_transition_to(Paid));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Paid.can_transition_to(Paid));
    }
}
