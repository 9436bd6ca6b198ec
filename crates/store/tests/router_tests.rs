//! Integration tests for queue routing: mapping creation, caching, and
//! shard derivation.

mod common;

use common::TestStore;

#[tokio::test]
async fn test_mapping_is_stable_across_resolves() {
    let fixture = TestStore::new().await.expect("Failed to create store");
    let router = fixture.store.router();

    let first = router.resolve("orders").await.expect("Resolve failed");
    let second = router.resolve("orders").await.expect("Resolve failed");
    assert_eq!(first, second);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_mappings")
        .fetch_one(fixture.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn test_shard_assignment_follows_queue_id() {
    let fixture = TestStore::with_table_groups(3)
        .await
        .expect("Failed to create store");
    let router = fixture.store.router();
    assert_eq!(router.table_groups(), 3);

    for name in ["a", "b", "c", "d", "e", "f"] {
        let mapping = router.resolve(name).await.expect("Resolve failed");
        assert_eq!(mapping.shard_id, mapping.queue_id % 3);
    }
}

#[tokio::test]
async fn test_concurrent_first_resolve_creates_one_row() {
    let fixture = TestStore::new().await.expect("Failed to create store");
    let router = fixture.store.router();

    let (first, second) = tokio::join!(router.resolve("fresh"), router.resolve("fresh"));
    let first = first.expect("Resolve failed");
    let second = second.expect("Resolve failed");
    assert_eq!(first, second);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_mappings WHERE queue_name = ?")
        .bind("fresh")
        .fetch_one(fixture.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn test_resolve_caches_the_mapping_before_returning() {
    let fixture = TestStore::new().await.expect("Failed to create store");
    let router = fixture.store.router();

    let first = router.resolve("orders").await.expect("Resolve failed");

    // A finished resolve has already cached the mapping, so the lost row
    // is never noticed and no replacement mapping is created.
    sqlx::query("DELETE FROM queue_mappings WHERE queue_name = ?")
        .bind("orders")
        .execute(fixture.pool())
        .await
        .unwrap();

    let second = router.resolve("orders").await.expect("Resolve failed");
    assert_eq!(first, second);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_mappings")
        .fetch_one(fixture.pool())
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn test_resolve_picks_up_existing_mapping() {
    let fixture = TestStore::new().await.expect("Failed to create store");

    sqlx::query("INSERT INTO queue_mappings (queue_name) VALUES (?)")
        .bind("prewired")
        .execute(fixture.pool())
        .await
        .unwrap();
    let expected: i32 = sqlx::query_scalar("SELECT queue_id FROM queue_mappings WHERE queue_name = ?")
        .bind("prewired")
        .fetch_one(fixture.pool())
        .await
        .unwrap();

    let mapping = fixture
        .store
        .router()
        .resolve("prewired")
        .await
        .expect("Resolve failed");
    assert_eq!(mapping.queue_id, expected);
}

#[tokio::test]
async fn test_recreated_queue_gets_a_fresh_id() {
    let fixture = TestStore::new().await.expect("Failed to create store");
    let store = fixture.store();
    let router = fixture.store.router();

    let original = router.resolve("jobs").await.expect("Resolve failed");
    store.remove_queue("jobs").await.expect("Remove failed");
    store.add_queue("jobs").await.expect("Add failed");

    // Ids are never reused, so the new mapping differs and its shard is
    // derived from the new id.
    let recreated = router.resolve("jobs").await.expect("Resolve failed");
    assert!(recreated.queue_id > original.queue_id);
    assert_eq!(
        recreated.shard_id,
        recreated.queue_id % router.table_groups() as i32
    );
}

#[tokio::test]
async fn test_resolution_survives_a_thrashing_cache() {
    let fixture = TestStore::with_config(|config| config.queue_cache_weight = 1)
        .await
        .expect("Failed to create store");
    let router = fixture.store.router();

    let orders_first = router.resolve("orders").await.expect("Resolve failed");
    let billing_first = router.resolve("billing").await.expect("Resolve failed");
    let orders_second = router.resolve("orders").await.expect("Resolve failed");
    let billing_second = router.resolve("billing").await.expect("Resolve failed");

    assert_eq!(orders_first, orders_second);
    assert_eq!(billing_first, billing_second);
    assert_ne!(orders_first.queue_id, billing_first.queue_id);
}
