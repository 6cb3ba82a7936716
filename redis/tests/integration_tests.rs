//! Integration tests against a live Redis.
//!
//! Ignored by default: they need a reachable Redis. Run with:
//!
//! ```text
//! REDIS_URL=redis://127.0.0.1:6379 \
//!     cargo test -p stampede-redis -- --ignored --test-threads=1
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // test code

use std::time::Duration;

use redis::AsyncCommands;
use stampede_core::EventLog;
use stampede_redis::{RedisEventLog, SaleControl};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

async fn raw_conn() -> redis::aio::MultiplexedConnection {
    let client = redis::Client::open(redis_url()).expect("redis client");
    client
        .get_multiplexed_async_connection()
        .await
        .expect("redis connection")
}

async fn fresh_log(stream: &str, consumer: &str) -> RedisEventLog {
    let mut conn = raw_conn().await;
    let _: i64 = conn.del(stream).await.expect("reset stream");
    let log = RedisEventLog::connect(&redis_url(), stream, "g1", consumer)
        .await
        .expect("connect");
    log.ensure_group().await.expect("create group");
    log
}

async fn append(stream: &str, uid: &str) -> String {
    let mut conn = raw_conn().await;
    conn.xadd(stream, "*", &[("uid", uid)])
        .await
        .expect("XADD")
}

#[tokio::test]
#[ignore = "requires a live Redis"]
async fn ensure_group_tolerates_existing_group() {
    let log = fresh_log("it:stream:ensure", "c1").await;
    // Second call hits BUSYGROUP and must still succeed.
    log.ensure_group().await.expect("idempotent ensure_group");
}

#[tokio::test]
#[ignore = "requires a live Redis"]
async fn claimed_entries_carry_fields_and_ack_clears_them() {
    let stream = "it:stream:claim";
    let log = fresh_log(stream, "c1").await;
    append(stream, "user-a").await;

    let batch = log
        .read_batch(16, Duration::from_millis(500))
        .await
        .expect("read");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].user_id(), Some("user-a"));

    log.ack(&batch[0].id).await.expect("ack");

    // Nothing left pending for the reclaim sweep.
    let reclaimed = log
        .reclaim(Duration::from_millis(0), 16)
        .await
        .expect("reclaim");
    assert!(reclaimed.is_empty());
}

#[tokio::test]
#[ignore = "requires a live Redis"]
async fn unacked_entries_are_reclaimable_by_a_sibling() {
    let stream = "it:stream:reclaim";
    let crashed = fresh_log(stream, "crashed").await;
    append(stream, "user-b").await;

    // Claim without acking, as a crashed consumer would.
    let batch = crashed
        .read_batch(16, Duration::from_millis(500))
        .await
        .expect("read");
    assert_eq!(batch.len(), 1);

    let sibling = RedisEventLog::connect(&redis_url(), stream, "g1", "sibling")
        .await
        .expect("connect");
    let reclaimed = sibling
        .reclaim(Duration::from_millis(0), 16)
        .await
        .expect("reclaim");
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, batch[0].id);
    assert_eq!(reclaimed[0].user_id(), Some("user-b"));

    sibling.ack(&reclaimed[0].id).await.expect("ack");
}

#[tokio::test]
#[ignore = "requires a live Redis"]
async fn sale_control_arms_reads_and_clears() {
    let control = SaleControl::connect(&redis_url()).await.expect("connect");

    control.init_sale(1001, 500).await.expect("arm sale");
    assert_eq!(control.current_sale().await.expect("read"), Some(1001));
    assert_eq!(control.stock().await.expect("stock"), 500);

    // Re-arming replaces the previous sale wholesale.
    control.init_sale(2002, 10).await.expect("re-arm");
    assert_eq!(control.current_sale().await.expect("read"), Some(2002));
    assert_eq!(control.stock().await.expect("stock"), 10);

    control.clear_sale().await.expect("clear");
    assert_eq!(control.current_sale().await.expect("read"), None);
    assert_eq!(control.stock().await.expect("stock"), 0);
}
