//! E2E test: compaction, storage, and expiry of large results

use std::time::Duration;

use mcpbridge::compact::CompactionConfig;
use mcpbridge::store::ResultStore;
use serde_json::json;

#[tokio::test]
async fn large_sequence_compacts_and_round_trips() {
    let compaction = CompactionConfig::default();
    let store = ResultStore::new(Duration::from_secs(600));

    let payload = json!((0..21).collect::<Vec<i64>>());
    assert!(compaction.is_large(&payload));

    let summary = compaction.summarize("srv", "t", &payload);
    let preview = compaction.preview(&payload);
    let id = store.make_id("srv", "t", 1_700_000_000_000);
    store.insert(id.clone(), payload.clone(), summary.clone()).await;

    assert_eq!(summary["type"], json!("array"));
    assert_eq!(summary["item_count"], json!(21));
    assert_eq!(preview["_preview"], json!(true));
    assert_eq!(preview["total_items"], json!(21));
    assert_eq!(preview["showing"], json!(5));
    assert_eq!(preview["items"], json!([0, 1, 2, 3, 4]));

    // The stored payload deep-equals the original.
    let retrieved = store.get(&id).await.unwrap();
    assert_eq!(retrieved.payload, payload);
    assert!(retrieved.age_seconds <= 600);
}

#[tokio::test]
async fn small_payload_is_not_classified_large() {
    let compaction = CompactionConfig::default();
    let payload = json!({"rows": [1, 2, 3]});
    assert!(!compaction.is_large(&payload));
}

#[tokio::test]
async fn result_expires_after_ttl() {
    let store = ResultStore::new(Duration::from_millis(50));
    let id = store.make_id("srv", "t", 1_700_000_000_000);
    store.insert(id.clone(), json!([1, 2, 3]), json!({})).await;

    assert!(store.get(&id).await.is_ok());

    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = store.get(&id).await.unwrap_err();
    assert!(err.to_string().contains("expired"), "got: {err}");

    // Gone from the listing too.
    assert!(store.list().await.is_empty());
}

#[tokio::test]
async fn sweep_removes_expired_entries() {
    let store = ResultStore::new(Duration::from_millis(50));
    store.insert("a".into(), json!(1), json!({})).await;
    store.insert("b".into(), json!(2), json!({})).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.sweep().await, 2);
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn result_ids_are_unique_across_identical_calls() {
    let store = ResultStore::new(Duration::from_secs(600));
    let a = store.make_id("srv", "t", 1_700_000_000_000);
    let b = store.make_id("srv", "t", 1_700_000_000_000);
    assert_ne!(a, b);
}
