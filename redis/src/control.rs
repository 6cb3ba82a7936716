//! Flash-sale admin control.
//!
//! The edge tier that admits purchase requests shares a handful of
//! keys with this service: the armed product, its remaining stock and
//! the per-request sequence counter. Arming a new sale resets them in
//! one pipeline; the stream itself is left alone so the consumer group
//! survives across sales.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use thiserror::Error;
use tracing::info;

/// Remaining stock counter, decremented by the edge tier.
const KEY_STOCK: &str = "seckill:stock";
/// Per-request sequence counter.
const KEY_REQ_SEQ: &str = "req:seq";
/// User-to-request dedup hash.
const KEY_UID_TO_REQ: &str = "uid2req";
/// The purchase stream; deleted only on a full clear.
const KEY_STREAM_ORDERS: &str = "stream:orders";
/// The currently armed product, absent when no sale is running.
const KEY_CURRENT_PRODUCT: &str = "seckill:product_id";

/// Errors from the sale control surface.
#[derive(Error, Debug)]
pub enum ControlError {
    /// Redis could not be reached or a command failed.
    #[error("sale control unavailable: {0}")]
    Unavailable(String),

    /// A shared key held a value of the wrong shape.
    #[error("corrupt sale state: {0}")]
    Corrupt(String),
}

impl From<redis::RedisError> for ControlError {
    fn from(e: redis::RedisError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

/// Arms, inspects and clears the flash sale shared with the edge tier.
///
/// # Thread Safety
///
/// `Clone` and shareable; clones share one [`ConnectionManager`].
pub struct SaleControl {
    conn_manager: ConnectionManager,
}

impl SaleControl {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unavailable`] if the URL is malformed
    /// or the connection cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self, ControlError> {
        let client = Client::open(redis_url).map_err(|e| {
            ControlError::Unavailable(format!("failed to create Redis client: {e}"))
        })?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            ControlError::Unavailable(format!("failed to create Redis connection manager: {e}"))
        })?;
        Ok(Self::with_manager(conn_manager))
    }

    /// Build over an existing [`ConnectionManager`].
    #[must_use]
    pub fn with_manager(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    /// Arm a sale: wipe the previous sale's counters and install the
    /// new product and stock atomically.
    ///
    /// The stream key is deliberately not touched, deleting it would
    /// orphan the consumer group.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unavailable`] if the pipeline fails.
    pub async fn init_sale(&self, product_id: i64, stock: i64) -> Result<(), ControlError> {
        let mut conn = self.conn_manager.clone();
        let _: () = redis::pipe()
            .del(KEY_STOCK)
            .ignore()
            .del(KEY_REQ_SEQ)
            .ignore()
            .del(KEY_UID_TO_REQ)
            .ignore()
            .del(KEY_CURRENT_PRODUCT)
            .ignore()
            .set(KEY_CURRENT_PRODUCT, product_id)
            .ignore()
            .set(KEY_STOCK, stock)
            .ignore()
            .set(KEY_REQ_SEQ, 0)
            .ignore()
            .query_async(&mut conn)
            .await?;

        info!(product_id, stock, "sale armed");
        Ok(())
    }

    /// The currently armed product, or `None` when no sale is running.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unavailable`] on command failure and
    /// [`ControlError::Corrupt`] if the key holds a non-numeric value.
    pub async fn current_sale(&self) -> Result<Option<i64>, ControlError> {
        let mut conn = self.conn_manager.clone();
        let raw: Option<String> = conn.get(KEY_CURRENT_PRODUCT).await?;
        match raw {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| ControlError::Corrupt(format!("invalid product id {value:?}"))),
        }
    }

    /// Remaining stock; missing key reads as zero.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unavailable`] on command failure and
    /// [`ControlError::Corrupt`] if the key holds a non-numeric value.
    pub async fn stock(&self) -> Result<i64, ControlError> {
        let mut conn = self.conn_manager.clone();
        let raw: Option<String> = conn.get(KEY_STOCK).await?;
        match raw {
            None => Ok(0),
            Some(value) => value
                .parse()
                .map_err(|_| ControlError::Corrupt(format!("invalid stock {value:?}"))),
        }
    }

    /// Tear the sale down completely, stream included.
    ///
    /// The next [`EventLog::ensure_group`](stampede_core::EventLog::ensure_group)
    /// call recreates the stream and group.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Unavailable`] if the deletion fails.
    pub async fn clear_sale(&self) -> Result<(), ControlError> {
        let mut conn = self.conn_manager.clone();
        let _: i64 = conn
            .del(&[
                KEY_STOCK,
                KEY_REQ_SEQ,
                KEY_UID_TO_REQ,
                KEY_STREAM_ORDERS,
                KEY_CURRENT_PRODUCT,
            ])
            .await?;
        info!("sale data cleared");
        Ok(())
    }
}

impl Clone for SaleControl {
    fn clone(&self) -> Self {
        Self {
            conn_manager: self.conn_manager.clone(),
        }
    }
}
