//! PostgreSQL implementations of the Stampede storage contracts.
//!
//! This crate provides [`PgOrderStore`] and [`PgProductCatalog`] over
//! a shared [`sqlx::PgPool`]. The order store leans on the
//! `orders_product_req_unique` constraint (see `migrations/`) to turn
//! concurrent duplicate commits into [`StoreError::DuplicateRequest`],
//! the deliberate idempotency signal of the pipeline.
//!
//! Schema lives in `migrations/`; apply with `sqlx migrate run` or
//! any migration runner of your choice.
//!
//! [`StoreError::DuplicateRequest`]: stampede_core::StoreError::DuplicateRequest

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod order_store;

pub use catalog::PgProductCatalog;
pub use order_store::PgOrderStore;
