//! In-memory fakes for exercising the Stampede pipeline without
//! external infrastructure.
//!
//! Each fake honors the failure semantics of the contract it stands in
//! for: the order store enforces the `(product_id, request_seq)`
//! uniqueness rule, the event log tracks pending/acknowledged state so
//! reclaim behaves like a real consumer group, and the publisher can
//! be armed to fail a fixed number of sends.
//!
//! These live in a separate crate so production crates never compile
//! test doubles in.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod log;
mod publish;
mod store;

pub use catalog::InMemoryCatalog;
pub use log::InMemoryEventLog;
pub use publish::RecordingPublisher;
pub use store::InMemoryOrderStore;
