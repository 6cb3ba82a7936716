//! Redis-backed implementations of the Stampede log contracts.
//!
//! [`RedisEventLog`] maps the [`EventLog`](stampede_core::EventLog)
//! contract onto a Redis Stream consumer group:
//!
//! - `ensure_group` → `XGROUP CREATE ... MKSTREAM` (BUSYGROUP is success)
//! - `read_batch`   → `XREADGROUP ... BLOCK ... COUNT ...`
//! - `ack`          → `XACK`
//! - `reclaim`      → `XAUTOCLAIM`, cursor reset after a full pass
//!
//! [`SaleControl`] is the small admin surface that arms and clears a
//! flash sale: the shared keys the edge tier decrements live here, the
//! ingestion side only ever reads them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod control;
mod event_log;

pub use control::{ControlError, SaleControl};
pub use event_log::{DEFAULT_GROUP, DEFAULT_STREAM, RedisEventLog};
