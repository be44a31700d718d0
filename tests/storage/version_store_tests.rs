//! VersionStore interface tests.
//!
//! These tests verify the contract of the VersionStore trait.
//! Each storage implementation should run these tests.

use projectionkit::storage::VersionStore;

// =============================================================================
// VersionStore::query tests
// =============================================================================

pub async fn test_query_nonexistent<S: VersionStore>(store: &S) {
    let version = store
        .query("test_vs_query", b"nonexistent")
        .await
        .expect("query should succeed");
    assert!(version.is_empty(), "unknown resource should have empty version");
}

// =============================================================================
// VersionStore::swap tests
// =============================================================================

pub async fn test_first_write<S: VersionStore>(store: &S) {
    let handler = "test_vs_first_write";

    let applied = store
        .swap(handler, b"order-1", b"", b"v1")
        .await
        .expect("swap should succeed");
    assert!(applied, "first write should apply");

    let version = store.query(handler, b"order-1").await.unwrap();
    assert_eq!(version, b"v1");
}

pub async fn test_order_lifecycle<S: VersionStore>(store: &S) {
    let handler = "test_vs_lifecycle";
    let resource = b"order-42";

    assert!(store.swap(handler, resource, b"", b"v1").await.unwrap());
    assert!(store.swap(handler, resource, b"v1", b"v2").await.unwrap());

    let redelivered = store.swap(handler, resource, b"v1", b"v2").await.unwrap();
    assert!(!redelivered, "stale swap must not apply");
    assert_eq!(store.query(handler, resource).await.unwrap(), b"v2");

    assert!(store.swap(handler, resource, b"v2", b"").await.unwrap());
    assert!(
        store.query(handler, resource).await.unwrap().is_empty(),
        "swap to empty should remove the record"
    );
}

pub async fn test_insert_over_existing_conflicts<S: VersionStore>(store: &S) {
    let handler = "test_vs_insert_conflict";

    assert!(store.swap(handler, b"r", b"", b"v1").await.unwrap());

    let applied = store.swap(handler, b"r", b"", b"v9").await.unwrap();
    assert!(!applied, "first write over an existing record must conflict");
    assert_eq!(store.query(handler, b"r").await.unwrap(), b"v1");
}

pub async fn test_update_missing_conflicts<S: VersionStore>(store: &S) {
    let handler = "test_vs_update_missing";

    let applied = store.swap(handler, b"r", b"v1", b"v2").await.unwrap();
    assert!(!applied, "update of a missing record must conflict");
    assert!(store.query(handler, b"r").await.unwrap().is_empty());
}

pub async fn test_delete_mismatch_conflicts<S: VersionStore>(store: &S) {
    let handler = "test_vs_delete_mismatch";

    assert!(store.swap(handler, b"r", b"", b"v2").await.unwrap());

    let applied = store.swap(handler, b"r", b"v1", b"").await.unwrap();
    assert!(!applied, "delete with a stale version must conflict");
    assert_eq!(store.query(handler, b"r").await.unwrap(), b"v2");
}

pub async fn test_empty_to_empty_on_absent_record<S: VersionStore>(store: &S) {
    let handler = "test_vs_absent";

    let applied = store
        .swap(handler, b"never-seen", b"", b"")
        .await
        .expect("absence check should succeed");
    assert!(applied, "empty to empty on a never-seen resource should apply");
    assert!(
        store.query(handler, b"never-seen").await.unwrap().is_empty(),
        "empty to empty must not create a record"
    );
    assert!(
        store.swap(handler, b"never-seen", b"", b"v1").await.unwrap(),
        "first write should still apply afterwards"
    );
}

pub async fn test_empty_to_empty_on_present_record<S: VersionStore>(store: &S) {
    let handler = "test_vs_present";

    assert!(store.swap(handler, b"r", b"", b"v1").await.unwrap());

    let applied = store
        .swap(handler, b"r", b"", b"")
        .await
        .expect("absence check should succeed");
    assert!(!applied, "empty to empty over an existing record must conflict");
    assert_eq!(store.query(handler, b"r").await.unwrap(), b"v1");
}

pub async fn test_rollback_discards_swap<S: VersionStore>(store: &S) {
    let handler = "test_vs_rollback";

    let mut unit = store.begin().await.unwrap();
    store
        .compare_and_swap(&mut unit, handler, b"r", b"", b"v1")
        .await
        .unwrap();
    store.rollback(unit).await.unwrap();

    assert!(store.query(handler, b"r").await.unwrap().is_empty());
}

// =============================================================================
// VersionStore::store / delete tests
// =============================================================================

pub async fn test_store_force_sets<S: VersionStore>(store: &S) {
    let handler = "test_vs_store";

    store.store(handler, b"r", b"v5").await.unwrap();
    assert_eq!(store.query(handler, b"r").await.unwrap(), b"v5");

    store.store(handler, b"r", b"v7").await.unwrap();
    assert_eq!(store.query(handler, b"r").await.unwrap(), b"v7");

    store.store(handler, b"r", b"").await.unwrap();
    assert!(store.query(handler, b"r").await.unwrap().is_empty());
}

pub async fn test_delete_is_idempotent<S: VersionStore>(store: &S) {
    let handler = "test_vs_delete";

    assert!(store.swap(handler, b"r", b"", b"v1").await.unwrap());
    store.delete(handler, b"r").await.unwrap();
    store.delete(handler, b"r").await.unwrap();

    assert!(store.query(handler, b"r").await.unwrap().is_empty());
    assert!(
        store.swap(handler, b"r", b"", b"v1").await.unwrap(),
        "resource should start over after delete"
    );
}

// =============================================================================
// Isolation tests
// =============================================================================

pub async fn test_handler_isolation<S: VersionStore>(store: &S) {
    let resource = b"shared-resource";

    assert!(store.swap("test_vs_iso_a", resource, b"", b"a1").await.unwrap());
    assert!(store.swap("test_vs_iso_b", resource, b"", b"b1").await.unwrap());

    assert_eq!(store.query("test_vs_iso_a", resource).await.unwrap(), b"a1");
    assert_eq!(store.query("test_vs_iso_b", resource).await.unwrap(), b"b1");
}

pub async fn test_binary_resource_keys<S: VersionStore>(store: &S) {
    let handler = "test_vs_binary";
    let first = [0x00, 0xff, 0x10];
    let second = [0x00, 0xff, 0x11];

    assert!(store.swap(handler, &first, b"", &[0xde, 0xad]).await.unwrap());
    assert!(store.query(handler, &second).await.unwrap().is_empty());
    assert_eq!(store.query(handler, &first).await.unwrap(), vec![0xde, 0xad]);
}

// =============================================================================
// Concurrency tests
// =============================================================================

pub async fn test_concurrent_first_writers<S: VersionStore>(store: &S) {
    let handler = "test_vs_race";
    let writers: Vec<Vec<u8>> = (0..8u8).map(|i| vec![b'w', i]).collect();

    let results = futures::future::join_all(
        writers
            .iter()
            .map(|next| store.swap(handler, b"contended", b"", next)),
    )
    .await;

    let wins = results
        .into_iter()
        .map(|r| r.expect("a lost race is not an error"))
        .filter(|applied| *applied)
        .count();
    assert_eq!(wins, 1, "exactly one first writer should win");

    let stored = store.query(handler, b"contended").await.unwrap();
    assert!(writers.contains(&stored));
}

pub async fn test_concurrent_identical_updates<S: VersionStore>(store: &S) {
    let handler = "test_vs_identical";

    assert!(store.swap(handler, b"contended", b"", b"v1").await.unwrap());

    let results = futures::future::join_all(
        (0..8).map(|_| store.swap(handler, b"contended", b"v1", b"v2")),
    )
    .await;

    let wins = results
        .into_iter()
        .map(|r| r.expect("a lost race is not an error"))
        .filter(|applied| *applied)
        .count();
    assert_eq!(wins, 1, "exactly one identical update should win");
    assert_eq!(store.query(handler, b"contended").await.unwrap(), b"v2");
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all VersionStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_version_store_tests {
    ($store:expr) => {
        use $crate::storage::version_store_tests::*;

        // query tests
        test_query_nonexistent($store).await;
        println!("  test_query_nonexistent: PASSED");

        // swap tests
        test_first_write($store).await;
        println!("  test_first_write: PASSED");

        test_order_lifecycle($store).await;
        println!("  test_order_lifecycle: PASSED");

        test_insert_over_existing_conflicts($store).await;
        println!("  test_insert_over_existing_conflicts: PASSED");

        test_update_missing_conflicts($store).await;
        println!("  test_update_missing_conflicts: PASSED");

        test_delete_mismatch_conflicts($store).await;
        println!("  test_delete_mismatch_conflicts: PASSED");

        test_empty_to_empty_on_absent_record($store).await;
        println!("  test_empty_to_empty_on_absent_record: PASSED");

        test_empty_to_empty_on_present_record($store).await;
        println!("  test_empty_to_empty_on_present_record: PASSED");

        test_rollback_discards_swap($store).await;
        println!("  test_rollback_discards_swap: PASSED");

        // store / delete tests
        test_store_force_sets($store).await;
        println!("  test_store_force_sets: PASSED");

        test_delete_is_idempotent($store).await;
        println!("  test_delete_is_idempotent: PASSED");

        // isolation tests
        test_handler_isolation($store).await;
        println!("  test_handler_isolation: PASSED");

        test_binary_resource_keys($store).await;
        println!("  test_binary_resource_keys: PASSED");

        // concurrency tests
        test_concurrent_first_writers($store).await;
        println!("  test_concurrent_first_writers: PASSED");

        test_concurrent_identical_updates($store).await;
        println!("  test_concurrent_identical_updates: PASSED");
    };
}
