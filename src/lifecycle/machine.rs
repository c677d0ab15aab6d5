//! State machine applying validated transitions to an item entry.
//!
//! Callers hold the item's lock for the whole transition, which serializes
//! explicit operations (start, pause) with completion and failure callbacks
//! for the same item.

use super::can_transition;
use crate::error::{Error, Result};
use crate::events::Notice;
use crate::item::registry::ItemEntry;
use crate::item::{Item, ItemState};
use crate::store::{item_key, put_record, Store};

use std::sync::Arc;
use tracing::info;

pub(crate) struct StateMachine {
    store: Arc<dyn Store>,
}

impl StateMachine {
    pub(crate) fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Move the item to `to`, persisting the new record first.
    pub(crate) fn transition(
        &self,
        entry: &mut ItemEntry,
        to: ItemState,
        action: &'static str,
    ) -> Result<Notice> {
        self.transition_with(entry, to, action, |_| {})
    }

    /// Move the item to `to`, applying `update` to the record in the same write.
    pub(crate) fn transition_with<F>(
        &self,
        entry: &mut ItemEntry,
        to: ItemState,
        action: &'static str,
        update: F,
    ) -> Result<Notice>
    where
        F: FnOnce(&mut Item),
    {
        let from = entry.item.state;
        if !can_transition(from, to) {
            return Err(Error::InvalidState {
                id: entry.item.id.clone(),
                state: from,
                action,
            });
        }

        let mut next = entry.item.clone();
        update(&mut next);
        next.state = to;
        put_record(self.store.as_ref(), &item_key(&next.id), &next)?;
        entry.item = next;

        info!("Item {} moved from {} to {}", entry.item.id, from, to);
        Ok(Notice::state(&entry.item.id, to))
    }

    /// Complete the item if every chunk is done.
    ///
    /// A paused item whose last in-flight chunk finishes is completed too.
    pub(crate) fn check_completion(&self, entry: &mut ItemEntry) -> Result<Option<Notice>> {
        match entry.item.state {
            ItemState::InProgress | ItemState::Paused if entry.ledger.all_done() => self
                .transition(entry, ItemState::Completed, "complete")
                .map(Some),
            _ => Ok(None),
        }
    }
}
