//! Tests for start-up recovery and background session handling.

use dtg::{ChunkStatus, ContentManagerBuilder, Error, ItemState, MemoryStore, Store};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod common;
use common::helpers::*;

/// Start a manager, download the chunks `complete` selects among the first
/// dispatched ones, then stop it.
async fn interrupted(
    dir: &std::path::Path,
    store: &MemoryStore,
    backend: &FakeBackend,
    chunks: usize,
    complete: &[u32],
) {
    let h = harness(dir, store.clone(), backend.clone(), FakeResolver::new(chunks), 2);
    h.manager.start().await.unwrap();
    add_and_start(&h.manager, "a").await;
    for handle in backend.outstanding() {
        if complete.contains(&handle.sequence_index) {
            backend.complete(&handle);
        }
    }
    wait_until(|| done_count(&h.manager, "a") == complete.len()).await;
    h.manager.stop();
    // Let the runtime drop the stopped listener.
    settle().await;
}

fn patch_item(store: &MemoryStore, id: &str, field: &str, value: serde_json::Value) {
    let key = format!("item/{}", id);
    let bytes = store.get(&key).unwrap().unwrap();
    let mut record: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    record[field] = value;
    store.put(&key, &serde_json::to_vec(&record).unwrap()).unwrap();
}

#[tokio::test]
async fn test_live_transfers_are_reattached() {
    let dir = create_temp_dir();
    let store = MemoryStore::new();
    let backend = FakeBackend::new();
    interrupted(dir.path(), &store, &backend, 3, &[]).await;
    assert_eq!(backend.outstanding().len(), 2);

    let h = harness(dir.path(), store, backend.clone(), FakeResolver::new(3), 2);
    let report = h.manager.start().await.unwrap();
    assert_eq!(report.transfers_reattached, 2);
    assert_eq!(report.chunks_reset, 0);
    assert_eq!(h.manager.active_transfers(), 2);
    assert_eq!(
        statuses(&h.manager, "a"),
        vec![ChunkStatus::Active, ChunkStatus::Active, ChunkStatus::Pending]
    );

    // Both slots are taken by the surviving transfers.
    h.manager.resume_interrupted_items().unwrap();
    assert_eq!(backend.requests().len(), 2);

    drive(
        &backend,
        || state_of(&h.manager, "a") == Some(ItemState::Completed),
        |_| true,
    )
    .await;
    assert_eq!(backend.requested_indices("a"), vec![0, 1, 2]);
    assert!(backend.max_outstanding() <= 2);
}

#[tokio::test]
async fn test_background_results_are_drained() {
    let dir = create_temp_dir();
    let store = MemoryStore::new();
    let backend = FakeBackend::new();
    interrupted(dir.path(), &store, &backend, 2, &[]).await;

    // Both transfers finish while no manager listens.
    for handle in backend.outstanding() {
        backend.complete(&handle);
    }

    let h = harness(dir.path(), store, backend.clone(), FakeResolver::new(2), 2);
    let report = h.manager.start().await.unwrap();
    assert_eq!(report.transfers_reattached, 2);
    assert_eq!(state_of(&h.manager, "a"), Some(ItemState::InProgress));

    let drained = Arc::new(AtomicUsize::new(0));
    let counter = drained.clone();
    let count = h
        .manager
        .handle_events_for_background_session(TEST_SESSION, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    assert_eq!(count, 2);
    assert_eq!(drained.load(Ordering::SeqCst), 1);
    assert_eq!(state_of(&h.manager, "a"), Some(ItemState::Completed));
    assert_eq!(
        h.manager.item_by_id("a").unwrap().downloaded_size,
        2 * CHUNK_SIZE
    );
    assert_eq!(h.manager.active_transfers(), 0);
    assert_eq!(backend.requests().len(), 2);

    // Nothing is left for a second call, nor for another session.
    let again = h
        .manager
        .handle_events_for_background_session(TEST_SESSION, || {})
        .await
        .unwrap();
    assert_eq!(again, 0);
    let other = h
        .manager
        .handle_events_for_background_session("other.session", || {})
        .await
        .unwrap();
    assert_eq!(other, 0);
}

#[tokio::test]
async fn test_background_session_before_start() {
    let dir = create_temp_dir();
    let h = harness(
        dir.path(),
        MemoryStore::new(),
        FakeBackend::new(),
        FakeResolver::new(1),
        1,
    );

    let drained = Arc::new(AtomicUsize::new(0));
    let counter = drained.clone();
    let result = h
        .manager
        .handle_events_for_background_session(TEST_SESSION, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    assert!(matches!(result, Err(Error::NotStarted)));
    assert_eq!(drained.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_counters_are_healed() {
    let dir = create_temp_dir();
    let store = MemoryStore::new();
    interrupted(dir.path(), &store, &FakeBackend::new(), 2, &[0]).await;
    patch_item(&store, "a", "downloaded_size", serde_json::json!(12345));

    let h = harness(
        dir.path(),
        store.clone(),
        FakeBackend::new(),
        FakeResolver::new(2),
        2,
    );
    let report = h.manager.start().await.unwrap();
    assert_eq!(report.counters_healed, 1);
    assert_eq!(h.manager.item_by_id("a").unwrap().downloaded_size, CHUNK_SIZE);

    // The healed value is durable.
    let bytes = store.get("item/a").unwrap().unwrap();
    let record: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(record["downloaded_size"], serde_json::json!(CHUNK_SIZE));
}

#[tokio::test]
async fn test_missing_chunk_files_are_downloaded_again() {
    let dir = create_temp_dir();
    let store = MemoryStore::new();
    interrupted(dir.path(), &store, &FakeBackend::new(), 2, &[0]).await;
    fs::remove_file(dir.path().join("items").join("a").join("000000.ts")).unwrap();

    let h = harness(
        dir.path(),
        store,
        FakeBackend::new(),
        FakeResolver::new(2),
        2,
    );
    let report = h.manager.start().await.unwrap();
    assert_eq!(report.missing_files, 1);
    assert_eq!(report.chunks_reset, 1);
    assert_eq!(report.counters_healed, 1);
    assert_eq!(
        statuses(&h.manager, "a"),
        vec![ChunkStatus::Pending, ChunkStatus::Pending]
    );
    assert_eq!(h.manager.item_by_id("a").unwrap().downloaded_size, 0);

    h.manager.resume_interrupted_items().unwrap();
    assert_eq!(h.backend.requested_indices("a"), vec![0, 1]);
}

#[tokio::test]
async fn test_finished_items_are_completed() {
    let dir = create_temp_dir();
    let store = MemoryStore::new();
    interrupted(dir.path(), &store, &FakeBackend::new(), 2, &[0, 1]).await;
    // The process died between the last chunk and the completion.
    patch_item(&store, "a", "state", serde_json::json!("inProgress"));

    let h = harness(
        dir.path(),
        store,
        FakeBackend::new(),
        FakeResolver::new(2),
        2,
    );
    let report = h.manager.start().await.unwrap();
    assert_eq!(report.items_completed, 1);
    assert_eq!(state_of(&h.manager, "a"), Some(ItemState::Completed));
    assert_eq!(h.delegate.states("a"), vec![ItemState::Completed]);
}

#[tokio::test]
async fn test_orphans_are_swept() {
    let dir = create_temp_dir();
    let store = MemoryStore::new();
    interrupted(dir.path(), &store, &FakeBackend::new(), 2, &[0]).await;

    store.put("chunk/ghost/00000000", b"{}").unwrap();
    let ghost_dir = dir.path().join("items").join("ghost");
    fs::create_dir_all(&ghost_dir).unwrap();
    fs::write(ghost_dir.join("000000.ts"), b"leftover").unwrap();

    let h = harness(
        dir.path(),
        store.clone(),
        FakeBackend::new(),
        FakeResolver::new(2),
        2,
    );
    let report = h.manager.start().await.unwrap();
    assert_eq!(report.orphans_swept, 2);
    assert!(store.keys("chunk/ghost/").unwrap().is_empty());
    assert_eq!(store.keys("chunk/a/").unwrap().len(), 2);
    assert!(!ghost_dir.exists());
    assert!(dir.path().join("items").join("a").join("000000.ts").is_file());
}

#[tokio::test]
async fn test_unreadable_records_are_skipped() {
    let dir = create_temp_dir();
    let store = MemoryStore::new();
    interrupted(dir.path(), &store, &FakeBackend::new(), 2, &[]).await;
    store.put("item/broken", b"not json").unwrap();

    let h = harness(
        dir.path(),
        store,
        FakeBackend::new(),
        FakeResolver::new(2),
        2,
    );
    let report = h.manager.start().await.unwrap();
    assert_eq!(report.items_loaded, 1);
    assert!(h.manager.item_by_id("broken").is_none());
    assert!(h.manager.item_by_id("a").is_some());
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    init_tracing();
    let dir = create_temp_dir();

    let first = ContentManagerBuilder::new(FakeResolver::new(3))
        .storage_path(dir.path())
        .backend(FakeBackend::new())
        .build()
        .unwrap();
    first.start().await.unwrap();
    first.add_item("a", &item_url("a")).unwrap();
    first.load_item_metadata("a", None).await.unwrap();
    first.stop();
    assert!(dir.path().join("records").is_dir());

    let second = ContentManagerBuilder::new(FakeResolver::new(3))
        .storage_path(dir.path())
        .backend(FakeBackend::new())
        .build()
        .unwrap();
    let report = second.start().await.unwrap();
    assert_eq!(report.items_loaded, 1);

    let item = second.item_by_id("a").unwrap();
    assert_eq!(item.state, ItemState::MetadataLoaded);
    assert_eq!(item.estimated_size, Some(3 * CHUNK_SIZE));
    assert_eq!(item.selected_track.unwrap().bitrate, TEST_BITRATE);
    assert_eq!(second.item_chunks("a").unwrap().len(), 3);
}
