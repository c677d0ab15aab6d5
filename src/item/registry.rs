//! Item registry.
//!
//! The [`ItemRegistry`] maps item ids to their entries. Each entry holds the
//! item record and its chunk ledger behind a dedicated mutex: that mutex is
//! the per-item critical section every state transition, counter update and
//! chunk mutation goes through. The id map itself is only locked long enough
//! to look an entry up, insert or remove it, so unrelated items never wait on
//! each other.
//!
//! Every mutation is persisted to the [`Store`] before it becomes visible.

use super::model::{Item, ItemState};
use crate::chunk::ChunkLedger;
use crate::error::{Error, Result};
use crate::store::{item_key, put_record, Store};

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// An item record and its chunk ledger.
#[derive(Debug)]
pub(crate) struct ItemEntry {
    pub(crate) item: Item,
    pub(crate) ledger: ChunkLedger,
}

impl ItemEntry {
    pub(crate) fn new(item: Item, ledger: ChunkLedger) -> Self {
        Self { item, ledger }
    }

    /// Returns `true` once the entry has been deleted from the registry.
    pub(crate) fn is_removed(&self) -> bool {
        self.item.state == ItemState::Removed
    }
}

pub(crate) type SharedEntry = Arc<Mutex<ItemEntry>>;

/// In-memory and persisted mapping of item id to item record.
pub(crate) struct ItemRegistry {
    store: Arc<dyn Store>,
    items: RwLock<HashMap<String, SharedEntry>>,
}

impl ItemRegistry {
    pub(crate) fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new item in the `new` state.
    pub(crate) fn create(&self, id: &str, url: &Url) -> Result<Item> {
        let mut items = self.items.write();
        if items.contains_key(id) {
            return Err(Error::DuplicateId(id.to_string()));
        }

        let item = Item::new(id, url);
        put_record(self.store.as_ref(), &item_key(id), &item)?;
        items.insert(
            id.to_string(),
            Arc::new(Mutex::new(ItemEntry::new(item.clone(), ChunkLedger::new()))),
        );

        debug!("Registered item {}", id);
        Ok(item)
    }

    /// Snapshot of an item.
    pub(crate) fn get(&self, id: &str) -> Option<Item> {
        self.entry(id).map(|entry| entry.lock().item.clone())
    }

    /// The entry of an item, if registered.
    pub(crate) fn entry(&self, id: &str) -> Option<SharedEntry> {
        self.items.read().get(id).cloned()
    }

    /// The entry of an item, or `ItemNotFound`.
    pub(crate) fn require(&self, id: &str) -> Result<SharedEntry> {
        self.entry(id)
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))
    }

    /// Every registered entry.
    pub(crate) fn entries(&self) -> Vec<SharedEntry> {
        self.items.read().values().cloned().collect()
    }

    /// Snapshots of the items in `state`, ordered by id.
    pub(crate) fn list_by_state(&self, state: ItemState) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .entries()
            .iter()
            .map(|entry| entry.lock().item.clone())
            .filter(|item| item.state == state)
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    /// Add newly stored bytes to an item's counters.
    ///
    /// The counter mirrors the sum of the item's done chunks, whose records
    /// are already durable when this is called, so the in-memory value is
    /// updated even if writing the item record fails.
    pub(crate) fn update_counters(&self, entry: &mut ItemEntry, delta: u64) -> Result<()> {
        entry.item.downloaded_size += delta;
        debug_assert_eq!(entry.item.downloaded_size, entry.ledger.downloaded_bytes());
        put_record(self.store.as_ref(), &item_key(&entry.item.id), &entry.item)
    }

    /// Delete an item and its chunk records.
    ///
    /// The caller holds the entry's lock. Once the item record is gone the
    /// entry is tombstoned so that late callbacks holding a reference to it
    /// are discarded. Leftover chunk records are swept on the next start.
    pub(crate) fn delete(&self, entry: &mut ItemEntry) -> Result<()> {
        let id = entry.item.id.clone();
        self.store.delete(&item_key(&id))?;

        entry.item.state = ItemState::Removed;
        self.items.write().remove(&id);

        if let Err(e) = entry.ledger.delete_all(self.store.as_ref()) {
            warn!("Leaving chunk records of removed item {}: {}", id, e);
        }
        debug!("Deleted item {}", id);
        Ok(())
    }

    /// Register an entry rebuilt from persisted records.
    pub(crate) fn insert_loaded(&self, item: Item, ledger: ChunkLedger) {
        let id = item.id.clone();
        self.items
            .write()
            .insert(id, Arc::new(Mutex::new(ItemEntry::new(item, ledger))));
    }

    /// Forget every in-memory entry.
    pub(crate) fn clear(&self) {
        self.items.write().clear();
    }
}
