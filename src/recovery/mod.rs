//! Recovery coordinator.
//!
//! Runs when a content manager starts. It rebuilds the registry from the
//! persisted item and chunk records and reconciles them with what actually
//! survived:
//!
//! - `active` chunks whose transfer the backend still runs keep their state
//!   and occupy a scheduler slot; the others go back to `pending`
//! - `done` chunks whose file disappeared go back to `pending`
//! - `downloaded_size` is recomputed from the `done` chunks
//! - items whose chunks are all `done` are completed
//! - chunk records and chunk directories of unknown items are swept
//!
//! Every discrepancy is logged at `warn` and counted in the returned
//! [`RecoveryReport`].

use crate::backend::TransferHandle;
use crate::chunk::{Chunk, ChunkLedger, ChunkStatus};
use crate::error::Result;
use crate::events::Notice;
use crate::item::registry::ItemEntry;
use crate::item::{Item, ItemState};
use crate::manager::engine::Engine;
use crate::store::{chunk_prefix, item_key, put_record, Store, CHUNK_PREFIX, ITEM_PREFIX};
use crate::utils::paths::{decode_segment, items_dir};

use serde::de::DeserializeOwned;
use std::collections::HashSet;
use tokio::fs;
use tracing::{debug, info, warn};

/// What a start-up reconciliation found and fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Items loaded from the store.
    pub items_loaded: usize,
    /// Active chunks without a live transfer, returned to `pending`.
    pub chunks_reset: usize,
    /// Active chunks whose transfer is still running in the backend.
    pub transfers_reattached: usize,
    /// Items whose `downloaded_size` disagreed with their done chunks.
    pub counters_healed: usize,
    /// Done chunks whose file no longer exists.
    pub missing_files: usize,
    /// Chunk records and chunk directories that belonged to no item.
    pub orphans_swept: usize,
    /// Items completed because every chunk was already done.
    pub items_completed: usize,
}

fn read_record<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>> {
    let Some(bytes) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_slice(&bytes) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!("Skipping unreadable record {}: {}", key, e);
            Ok(None)
        }
    }
}

/// Rebuild the registry from the store and reconcile it with the backend.
pub(crate) async fn recover(engine: &Engine) -> Result<RecoveryReport> {
    let store = engine.store.as_ref();
    engine.registry.clear();
    engine.scheduler.clear();

    let live = engine.backend.live_handles().await;
    let mut report = RecoveryReport::default();
    let mut notices = Vec::new();
    let mut known = HashSet::new();

    for key in store.keys(ITEM_PREFIX)? {
        let Some(item) = read_record::<Item>(store, &key)? else {
            continue;
        };
        if item.state == ItemState::Removed {
            continue;
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        for chunk_key in store.keys(&chunk_prefix(&item.id))? {
            if let Some(chunk) = read_record::<Chunk>(store, &chunk_key)? {
                chunks.push(chunk);
            }
        }
        let mut entry = ItemEntry::new(item, ChunkLedger::from_records(chunks));

        reconcile_chunks(engine, &mut entry, &live, &mut report)?;

        let downloaded = entry.ledger.downloaded_bytes();
        if downloaded != entry.item.downloaded_size {
            warn!(
                "Item {} recorded {} bytes, its done chunks hold {}",
                entry.item.id, entry.item.downloaded_size, downloaded
            );
            entry.item.downloaded_size = downloaded;
            put_record(store, &item_key(&entry.item.id), &entry.item)?;
            report.counters_healed += 1;
        }

        if entry.item.state == ItemState::InProgress || entry.item.state == ItemState::Paused {
            if let Some(notice) = engine.machine.check_completion(&mut entry)? {
                warn!("Item {} was complete but not marked so", entry.item.id);
                report.items_completed += 1;
                notices.push(notice);
            }
        }

        debug!(
            "Loaded item {} ({}, {}/{} chunks done)",
            entry.item.id,
            entry.item.state,
            entry.ledger.count(ChunkStatus::Done),
            entry.ledger.len()
        );
        known.insert(entry.item.id.clone());
        let ItemEntry { item, ledger } = entry;
        engine.registry.insert_loaded(item, ledger);
        report.items_loaded += 1;
    }

    report.orphans_swept += sweep_orphan_records(store, &known)?;
    report.orphans_swept += sweep_orphan_directories(engine, &known).await;

    info!("Recovery finished: {:?}", report);
    engine.notifier.emit_all(notices);
    Ok(report)
}

fn reconcile_chunks(
    engine: &Engine,
    entry: &mut ItemEntry,
    live: &HashSet<TransferHandle>,
    report: &mut RecoveryReport,
) -> Result<()> {
    let store = engine.store.as_ref();
    let snapshot: Vec<Chunk> = entry.ledger.chunks().to_vec();

    for chunk in snapshot {
        let index = chunk.sequence_index;
        match chunk.status {
            ChunkStatus::Done => {
                let present = chunk.local_path.as_ref().is_some_and(|path| path.is_file());
                if !present {
                    warn!(
                        "File of chunk {} of item {} is missing: {:?}",
                        index, chunk.item_id, chunk.local_path
                    );
                    entry.ledger.forget_delivery(store, index)?;
                    report.missing_files += 1;
                }
            }
            ChunkStatus::Active => {
                let handle = chunk.handle();
                if live.contains(&handle) {
                    debug!("Reattached transfer {}", handle);
                    engine.scheduler.occupy(handle);
                    report.transfers_reattached += 1;
                } else {
                    warn!("Transfer {} did not survive, re-queueing", handle);
                    entry.ledger.reset_to_pending(store, index)?;
                    report.chunks_reset += 1;
                }
            }
            ChunkStatus::Pending | ChunkStatus::Failed => {}
        }
    }
    Ok(())
}

fn sweep_orphan_records(store: &dyn Store, known: &HashSet<String>) -> Result<usize> {
    let mut swept = 0;
    for key in store.keys(CHUNK_PREFIX)? {
        let id = key
            .strip_prefix(CHUNK_PREFIX)
            .and_then(|rest| rest.split('/').next())
            .map(decode_segment)
            .unwrap_or_default();
        if known.contains(&id) {
            continue;
        }
        warn!("Sweeping orphan chunk record {}", key);
        store.delete(&key)?;
        swept += 1;
    }
    Ok(swept)
}

async fn sweep_orphan_directories(engine: &Engine, known: &HashSet<String>) -> usize {
    let directory = items_dir(&engine.config.storage_path);
    let mut entries = match fs::read_dir(&directory).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("No chunk directory to sweep at {:?}: {}", directory, e);
            return 0;
        }
    };

    let mut swept = 0;
    while let Ok(Some(dir_entry)) = entries.next_entry().await {
        let name = dir_entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if known.contains(&decode_segment(name)) {
            continue;
        }
        warn!("Sweeping orphan chunk directory {:?}", dir_entry.path());
        match fs::remove_dir_all(dir_entry.path()).await {
            Ok(()) => swept += 1,
            Err(e) => warn!("Cannot sweep {:?}: {}", dir_entry.path(), e),
        }
    }
    swept
}

