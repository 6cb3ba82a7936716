//! Commit-path behavior over the in-memory fakes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // test code

use std::sync::Arc;

use chrono::Utc;
use stampede_core::catalog::{Product, ProductStatus, ResourceSpec};
use stampede_core::{CommitError, IdMinter, OrderStore, PurchaseCommitter};
use stampede_testing::{InMemoryCatalog, InMemoryOrderStore, RecordingPublisher};

struct Harness {
    catalog: Arc<InMemoryCatalog>,
    store: Arc<InMemoryOrderStore>,
    publisher: Arc<RecordingPublisher>,
    committer: PurchaseCommitter,
}

fn spec() -> ResourceSpec {
    ResourceSpec {
        cpus: 2,
        memory_mb: 4096,
        gpus: 0,
        image: "ubuntu:22.04".to_string(),
        config_json: br#"{"disk_gb":20}"#.to_vec(),
    }
}

fn harness() -> Harness {
    let catalog = Arc::new(InMemoryCatalog::new());
    let store = Arc::new(InMemoryOrderStore::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let committer = PurchaseCommitter::new(
        Arc::clone(&catalog) as Arc<dyn stampede_core::ProductCatalog>,
        Arc::clone(&store) as Arc<dyn stampede_core::OrderStore>,
        Arc::clone(&publisher) as Arc<dyn stampede_core::EventPublisher>,
        Arc::new(IdMinter::new()),
    );
    Harness {
        catalog,
        store,
        publisher,
        committer,
    }
}

#[tokio::test]
async fn first_commit_creates_paid_order_and_one_event() {
    let h = harness();
    h.catalog.insert_enabled(1001, 9900, spec());

    let committed = h
        .committer
        .commit(1001, "user-a", 7)
        .await
        .expect("commit succeeds");
    assert!(committed.order_id > 0);
    assert!(committed.resource_id > 0);

    let order = h.store.get(committed.order_id).await.expect("row exists");
    assert_eq!(order.product_id, 1001);
    assert_eq!(order.amount, 9900);
    assert_eq!(order.status.as_str(), "PAID");
    assert!(order.paid_at.is_some());
    assert_eq!(order.resource_id, committed.resource_id);

    let events = h.publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].resource_id, committed.resource_id);
    assert_eq!(events[0].shape.cpus, 2);
    assert_eq!(events[0].shape.memory_mb, 4096);
}

#[tokio::test]
async fn replayed_commit_folds_into_existing_order() {
    let h = harness();
    h.catalog.insert_enabled(1001, 9900, spec());

    let first = h.committer.commit(1001, "user-a", 7).await.expect("first");
    let second = h.committer.commit(1001, "user-a", 7).await.expect("replay");

    assert_eq!(first, second);
    assert_eq!(h.store.order_count(), 1);
    // One event, not two: the fold never republishes.
    assert_eq!(h.publisher.event_count(), 1);
}

#[tokio::test]
async fn disabled_product_is_rejected_without_side_effects() {
    let h = harness();
    let now = Utc::now();
    h.catalog.insert(Product {
        id: 2002,
        name: "retired".to_string(),
        description: String::new(),
        status: ProductStatus::Disabled,
        price: 100,
        spec: Some(spec()),
        created_at: now,
        updated_at: now,
    });

    let err = h
        .committer
        .commit(2002, "user-a", 7)
        .await
        .expect_err("disabled product must be rejected");
    assert!(matches!(err, CommitError::ProductDisabled(2002)));
    assert!(!err.is_retryable());
    assert_eq!(h.store.order_count(), 0);
    assert_eq!(h.publisher.event_count(), 0);
}

#[tokio::test]
async fn unknown_product_is_permanent() {
    let h = harness();
    let err = h
        .committer
        .commit(404, "user-a", 7)
        .await
        .expect_err("unknown product");
    assert!(matches!(err, CommitError::ProductNotFound(404)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn enabled_product_without_spec_is_permanent() {
    let h = harness();
    let now = Utc::now();
    h.catalog.insert(Product {
        id: 3003,
        name: "broken".to_string(),
        description: String::new(),
        status: ProductStatus::Enabled,
        price: 100,
        spec: None,
        created_at: now,
        updated_at: now,
    });

    let err = h
        .committer
        .commit(3003, "user-a", 7)
        .await
        .expect_err("spec-less product");
    assert!(matches!(err, CommitError::InvalidCatalogEntry(3003)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn catalog_outage_is_retryable() {
    let h = harness();
    h.catalog.set_unavailable(true);

    let err = h
        .committer
        .commit(1001, "user-a", 7)
        .await
        .expect_err("outage");
    assert!(matches!(err, CommitError::Catalog(_)));
    assert!(err.is_retryable());
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn publish_failure_keeps_the_row_and_retry_folds() {
    let h = harness();
    h.catalog.insert_enabled(1001, 9900, spec());
    h.publisher.fail_next(1);

    let err = h
        .committer
        .commit(1001, "user-a", 7)
        .await
        .expect_err("publish fails");
    assert!(matches!(err, CommitError::Publish(_)));
    assert!(err.is_retryable());
    // The order survives the failed publish.
    assert_eq!(h.store.order_count(), 1);

    // The retry folds into the existing row instead of double-selling.
    let committed = h.committer.commit(1001, "user-a", 7).await.expect("retry");
    assert_eq!(h.store.order_count(), 1);
    let order = h.store.get(committed.order_id).await.expect("row");
    assert_eq!(order.request_seq, 7);
}

#[tokio::test]
async fn provisioning_callback_completes_the_order_once() {
    let h = harness();
    h.catalog.insert_enabled(1001, 9900, spec());
    let committed = h.committer.commit(1001, "user-a", 7).await.expect("commit");

    // The provisioning callback marks the order completed.
    h.store
        .update_status(committed.order_id, stampede_core::OrderStatus::Completed)
        .await
        .expect("PAID -> COMPLETED");

    let order = h.store.get(committed.order_id).await.expect("row");
    assert_eq!(order.status, stampede_core::OrderStatus::Completed);
    assert!(order.completed_at.is_some());

    // Terminal states never regress.
    let err = h
        .store
        .update_status(committed.order_id, stampede_core::OrderStatus::Cancelled)
        .await
        .expect_err("no regression");
    assert!(matches!(
        err,
        stampede_core::StoreError::InvalidTransition { .. }
    ));
}

#[tokio::test]
async fn zero_request_seq_mints_distinct_sequences() {
    let h = harness();
    h.catalog.insert_enabled(1001, 9900, spec());

    let a = h.committer.commit(1001, "user-a", 0).await.expect("first");
    let b = h.committer.commit(1001, "user-a", 0).await.expect("second");

    // Each direct purchase is a fresh logical request.
    assert_ne!(a.order_id, b.order_id);
    assert_eq!(h.store.order_count(), 2);
    assert_eq!(h.publisher.event_count(), 2);

    // Replaying with the sequence that was minted for the first call
    // folds instead of creating a third order.
    let minted_seq = h.store.get(a.order_id).await.expect("row").request_seq;
    let replay = h
        .committer
        .commit(1001, "user-a", minted_seq)
        .await
        .expect("replay");
    assert_eq!(replay, a);
    assert_eq!(h.store.order_count(), 2);
}
