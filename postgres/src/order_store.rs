//! Order persistence over PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use stampede_core::{Order, OrderStatus, OrderStore, StoreError};
use tracing::debug;

/// PostgreSQL-backed [`OrderStore`].
///
/// The pool is shared across all stream partitions handled by one
/// process; no in-process locking is needed because all cross-process
/// coordination is pushed down to the uniqueness constraint.
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: &PgRow) -> Result<Order, StoreError> {
        let corrupt = |e: sqlx::Error| StoreError::Corrupt(e.to_string());
        let status_str: String = row.try_get("status").map_err(corrupt)?;
        let status = OrderStatus::parse(&status_str)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status {status_str:?}")))?;
        Ok(Order {
            order_id: row.try_get("order_id").map_err(corrupt)?,
            user_id: row.try_get("user_id").map_err(corrupt)?,
            product_id: row.try_get("product_id").map_err(corrupt)?,
            request_seq: row.try_get("req_seq").map_err(corrupt)?,
            amount: row.try_get("amount").map_err(corrupt)?,
            resource_id: row.try_get("resource_id").map_err(corrupt)?,
            status,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(corrupt)?,
            paid_at: row.try_get("paid_at").map_err(corrupt)?,
            completed_at: row.try_get("completed_at").map_err(corrupt)?,
        })
    }

    async fn fetch_one(&self, query: &str, bind: &[i64]) -> Result<Order, StoreError> {
        let mut q = sqlx::query(query);
        for value in bind {
            q = q.bind(value);
        }
        let row = q
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .ok_or(StoreError::NotFound)?;
        Self::row_to_order(&row)
    }
}

const SELECT_COLUMNS: &str = "order_id, user_id, product_id, req_seq, amount, \
                              resource_id, status, created_at, paid_at, completed_at";

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO orders (
                order_id, user_id, product_id, req_seq, amount,
                resource_id, status, created_at, paid_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(order.order_id)
        .bind(&order.user_id)
        .bind(order.product_id)
        .bind(order.request_seq)
        .bind(order.amount)
        .bind(order.resource_id)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.paid_at)
        .bind(order.completed_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(order_id = order.order_id, "order row inserted");
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                metrics::counter!("stampede.store.unique_violation").increment(1);
                Err(StoreError::DuplicateRequest {
                    product_id: order.product_id,
                    request_seq: order.request_seq,
                })
            }
            Err(e) => Err(StoreError::Unavailable(e.to_string())),
        }
    }

    async fn get(&self, order_id: i64) -> Result<Order, StoreError> {
        self.fetch_one(
            &format!("SELECT {SELECT_COLUMNS} FROM orders WHERE order_id = $1"),
            &[order_id],
        )
        .await
    }

    async fn get_by_request(
        &self,
        product_id: i64,
        request_seq: i64,
    ) -> Result<Order, StoreError> {
        self.fetch_one(
            &format!("SELECT {SELECT_COLUMNS} FROM orders WHERE product_id = $1 AND req_seq = $2"),
            &[product_id, request_seq],
        )
        .await
    }

    async fn update_status(&self, order_id: i64, status: OrderStatus) -> Result<(), StoreError> {
        if status == OrderStatus::Paid {
            // Orders are born PAID; no transition leads back to it.
            let current = self.get(order_id).await?;
            return Err(StoreError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        // Single guarded UPDATE: the WHERE clause enforces the
        // monotonic rule (only PAID may advance) atomically.
        let result = sqlx::query(
            r"
            UPDATE orders
            SET status = $2,
                completed_at = CASE WHEN $2 = 'COMPLETED' THEN now()
                                    ELSE completed_at END
            WHERE order_id = $1 AND status = 'PAID'
            ",
        )
        .bind(order_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Rejected: distinguish a missing order from a transition the
        // monotonic rule forbids.
        let current = self.get(order_id).await?;
        Err(StoreError::InvalidTransition {
            from: current.status,
            to: status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pg_order_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PgOrderStore>();
    }
}
