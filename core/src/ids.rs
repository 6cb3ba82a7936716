//! Distributed identifier minting without central coordination.
//!
//! Order and resource identifiers are minted locally from a coarse
//! timestamp, a stable hash of a caller-supplied key, and a small
//! rotating counter. No network round-trip, no shared coordinator.
//!
//! # Bit layout
//!
//! One canonical layout is used for every identifier this crate mints:
//!
//! ```text
//! bit 63        62..60      59..18           17..3        2..0
//! ┌─────┐ ┌──────────┐ ┌────────────┐ ┌────────────┐ ┌─────────┐
//! │  0  │ │  unused  │ │ millis (42)│ │  hash (15) │ │ ctr (3) │
//! └─────┘ └──────────┘ └────────────┘ └────────────┘ └─────────┘
//! ```
//!
//! - 42 bits of milliseconds since [`EPOCH_MS`] (~139 years of range)
//! - 15 bits of FNV-1a hash of the caller-supplied key
//! - 3 bits of a wrapping per-process counter
//!
//! The top four bits stay zero, so values are always representable as
//! non-negative `i64` and sort/partition by their timestamp bucket.
//!
//! # Uniqueness
//!
//! This is a probabilistic scheme: the timestamp bucket is monotone
//! non-decreasing within one process, and the hash plus counter bits
//! only reduce the chance of cross-process collisions. It is NOT a
//! strict uniqueness guarantee. Callers must pair minted identifiers
//! with a storage-layer uniqueness constraint for correctness, which
//! is exactly what [`PurchaseCommitter`](crate::PurchaseCommitter)
//! does via the `(product_id, request_seq)` index.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Epoch anchor for the timestamp component: `2026-01-18T00:00:00Z`.
pub const EPOCH_MS: i64 = 1_768_665_600_000;

const TIME_BITS: u32 = 42;
const HASH_BITS: u32 = 15;
const COUNTER_BITS: u32 = 3;

const TIME_MASK: u64 = (1 << TIME_BITS) - 1;
const HASH_MASK: u64 = (1 << HASH_BITS) - 1;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;

const TIME_SHIFT: u32 = HASH_BITS + COUNTER_BITS;
const HASH_SHIFT: u32 = COUNTER_BITS;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Mints 64-bit identifiers for orders and resources.
///
/// `mint` always succeeds and performs no I/O; the only shared state
/// is the rotating counter. One minter is shared per process.
#[derive(Debug, Default)]
pub struct IdMinter {
    counter: AtomicU64,
}

impl IdMinter {
    /// Create a minter with the counter at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Mint a new identifier for `key`.
    ///
    /// The returned value is always non-negative. Two sequential calls
    /// in one process never see a decreasing timestamp bucket.
    #[must_use]
    pub fn mint(&self, key: &str) -> i64 {
        let now_ms = Utc::now().timestamp_millis();
        self.assemble(now_ms, key)
    }

    fn assemble(&self, now_ms: i64, key: &str) -> i64 {
        #[allow(clippy::cast_sign_loss)] // clamped non-negative before the cast
        let millis = (now_ms - EPOCH_MS).max(0) as u64 & TIME_MASK;
        let hash = fnv1a(key.as_bytes()) & HASH_MASK;
        let ctr = self.counter.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;

        let id = (millis << TIME_SHIFT) | (hash << HASH_SHIFT) | ctr;
        #[allow(clippy::cast_possible_wrap)] // top bits are zero by construction
        {
            id as i64
        }
    }
}

/// Extract the millisecond bucket from a minted identifier.
///
/// Used by tests and by operators partitioning on ID ranges.
#[must_use]
pub const fn timestamp_bucket(id: i64) -> i64 {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    {
        ((id as u64 >> TIME_SHIFT) & TIME_MASK) as i64
    }
}

/// Stable FNV-1a hash. Must never change: minted identifiers embed it.
const fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn minted_ids_are_non_negative() {
        let minter = IdMinter::new();
        for key in ["user-a", "user-b", "", "日本語", "a-very-long-key-with-entropy"] {
            assert!(minter.mint(key) >= 0, "negative id for key {key:?}");
        }
    }

    #[test]
    fn timestamp_bucket_is_monotone_for_sequential_mints() {
        let minter = IdMinter::new();
        let mut last = 0;
        for _ in 0..1000 {
            let bucket = timestamp_bucket(minter.mint("user-a"));
            assert!(bucket >= last, "bucket regressed: {bucket} < {last}");
            last = bucket;
        }
    }

    #[test]
    fn counter_rotates_through_low_bits() {
        let minter = IdMinter::new();
        // Fixed instant so only the counter varies.
        let ids: Vec<i64> = (0..8).map(|_| minter.assemble(EPOCH_MS + 1_000, "u")).collect();
        let low_bits: Vec<i64> = ids.iter().map(|id| id & 0b111).collect();
        assert_eq!(low_bits, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        // Same millisecond, same key: counter is what keeps these distinct.
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 8);
    }

    #[test]
    fn different_keys_differ_in_hash_bits() {
        let minter = IdMinter::new();
        let a = minter.assemble(EPOCH_MS + 5, "user-a");
        let b = minter.assemble(EPOCH_MS + 5, "user-b");
        assert_ne!((a >> 3) & 0x7FFF, (b >> 3) & 0x7FFF);
    }

    #[test]
    fn fnv1a_is_stable() {
        // Reference values pinned; a change here would corrupt ID
        // partitioning for already-issued identifiers.
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    proptest! {
        #[test]
        fn mint_never_returns_negative(key in ".*", offset in 0i64..4_000_000_000_000) {
            let minter = IdMinter::new();
            let id = minter.assemble(EPOCH_MS + offset, &key);
            prop_assert!(id >= 0);
        }
    }
}
