//! # Stampede Core
//!
//! Core domain types and orchestration for the Stampede flash-sale
//! ingestion pipeline.
//!
//! Stampede turns an at-least-once stream of purchase events into
//! exactly-once domain state: one order row and one downstream
//! provisioning request per logical purchase, under concurrent
//! consumers, crash/restart, and redelivery.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  Admission step  │  (external: decrements stock, appends entry)
//! └────────┬─────────┘
//!          │ append
//!          ▼
//! ┌──────────────────┐
//! │   Event log      │◄─── consumer-group claim / ack / reclaim
//! │ (Redis Streams)  │
//! └────────┬─────────┘
//!          │ claim
//!          ▼
//! ┌──────────────────┐
//! │  StreamIngestor  │  claim loop + reclaim sweep
//! └────────┬─────────┘
//!          │ commit
//!          ▼
//! ┌──────────────────┐     ┌──────────────────┐
//! │PurchaseCommitter │────►│   OrderStore     │◄─── uniqueness on
//! └────────┬─────────┘     │  (Postgres)      │     (product, req_seq)
//!          │ publish       └──────────────────┘
//!          ▼
//! ┌──────────────────┐
//! │  EventPublisher  │────► provisioning domain
//! └──────────────────┘
//! ```
//!
//! # Correctness model
//!
//! Delivery is at-least-once and unordered. The single correctness
//! backstop is the storage-layer uniqueness constraint over
//! `(product_id, request_seq)`: duplicate deliveries fold into the
//! previously committed order inside [`PurchaseCommitter`]. The
//! [`IdMinter`] provides probabilistic uniqueness only and must always
//! be paired with that constraint.
//!
//! # Crates
//!
//! - `stampede-postgres`: [`OrderStore`] / [`ProductCatalog`] over sqlx
//! - `stampede-redis`: [`EventLog`] over Redis Streams
//! - `stampede-kafka`: [`EventPublisher`] over rdkafka
//! - `stampede-testing`: in-memory implementations for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod committer;
pub mod ids;
pub mod ingestor;
pub mod log;
pub mod order;
pub mod publish;
pub mod store;

pub use catalog::{CatalogError, Product, ProductCatalog, ProductStatus, ResourceSpec};
pub use committer::{CommitError, Committed, PurchaseCommitter};
pub use ids::IdMinter;
pub use ingestor::{IngestError, IngestorConfig, IngestorHandle, IngestorState, StreamIngestor};
pub use log::{EntryId, EventLog, LogEntry, LogError, USER_ID_FIELD};
pub use order::{Order, OrderStatus};
pub use publish::{EventPublisher, PublishError, ResourceRequestEvent, ResourceShape};
pub use store::{OrderStore, StoreError};
