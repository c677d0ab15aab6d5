//! Bounded-concurrency chunk dispatcher.
//!
//! The [`Scheduler`] owns two things behind one mutex: the round-robin
//! rotation of admitted item ids and the set of transfer handles currently
//! in flight. The size of that set is the global active-chunk count; a chunk
//! is only marked active while the mutex is held and the set has room, so
//! the concurrency limit holds exactly no matter how many completions free
//! slots at once.
//!
//! Lock order is scheduler, then item. Code holding an item lock never calls
//! into the scheduler.

use crate::backend::{TransferHandle, TransferRequest};
use crate::error::Error;
use crate::item::registry::ItemRegistry;
use crate::item::ItemState;
use crate::store::Store;
use crate::utils::paths::chunk_path;

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Result of asking the scheduler for work.
#[derive(Debug)]
pub(crate) enum Claim {
    /// A chunk was marked active and must be handed to the backend.
    Dispatch(TransferRequest),
    /// The store refused to mark a chunk of `id` active. The item was
    /// withdrawn from the rotation.
    Stalled { id: String, error: Error },
    /// No slot is free or no chunk is eligible.
    Idle,
    /// Every admitted chunk waits out a retry backoff. The earliest one
    /// becomes eligible at the given instant.
    Backoff(Instant),
}

#[derive(Debug, Default)]
struct Slots {
    rotation: VecDeque<String>,
    in_flight: HashSet<TransferHandle>,
}

pub(crate) struct Scheduler {
    limit: usize,
    slots: Mutex<Slots>,
}

impl Scheduler {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    /// Add an item to the rotation. Admitting an item twice is a no-op.
    pub(crate) fn admit(&self, id: &str) -> bool {
        let mut slots = self.slots.lock();
        if slots.rotation.iter().any(|admitted| admitted == id) {
            return false;
        }
        slots.rotation.push_back(id.to_string());
        true
    }

    /// Ids currently in the rotation, in dispatch order.
    pub(crate) fn admitted(&self) -> Vec<String> {
        self.slots.lock().rotation.iter().cloned().collect()
    }

    /// Count a transfer that is already running (reattached at recovery).
    pub(crate) fn occupy(&self, handle: TransferHandle) {
        self.slots.lock().in_flight.insert(handle);
    }

    /// Free the slot of `handle`. Returns `false` if it held none.
    pub(crate) fn release(&self, handle: &TransferHandle) -> bool {
        self.slots.lock().in_flight.remove(handle)
    }

    /// Number of transfers in flight.
    pub(crate) fn in_flight(&self) -> usize {
        self.slots.lock().in_flight.len()
    }

    /// Forget the rotation and every slot.
    pub(crate) fn clear(&self) {
        let mut slots = self.slots.lock();
        slots.rotation.clear();
        slots.in_flight.clear();
    }

    /// Pick the next chunk to dispatch, round-robin across admitted items.
    ///
    /// Items that are no longer in progress, or that have nothing left to
    /// dispatch, leave the rotation; they are admitted again when they get
    /// pending chunks back.
    pub(crate) fn claim(
        &self,
        registry: &ItemRegistry,
        store: &dyn Store,
        storage_path: &Path,
    ) -> Claim {
        let mut slots = self.slots.lock();
        if slots.in_flight.len() >= self.limit {
            return Claim::Idle;
        }

        let now = Instant::now();
        let mut earliest: Option<Instant> = None;
        for _ in 0..slots.rotation.len() {
            let Some(id) = slots.rotation.pop_front() else {
                break;
            };
            let Some(entry) = registry.entry(&id) else {
                continue;
            };
            let mut entry = entry.lock();
            if entry.item.state != ItemState::InProgress {
                continue;
            }

            let Some(index) = entry.ledger.next_eligible(now) else {
                // Chunks waiting out a backoff keep their item in the rotation.
                if entry.ledger.has_pending() {
                    if let Some(at) = entry.ledger.next_retry_at(now) {
                        earliest = Some(earliest.map_or(at, |e| e.min(at)));
                    }
                    slots.rotation.push_back(id);
                }
                continue;
            };

            let chunk = match entry.ledger.mark_active(store, index) {
                Ok(chunk) => chunk,
                Err(error) => return Claim::Stalled { id, error },
            };
            let request = TransferRequest {
                handle: chunk.handle(),
                destination: chunk_path(storage_path, &id, index, &chunk.url),
                url: chunk.url,
                expected_size: chunk.byte_size,
            };

            debug!(
                "Claimed {} ({}/{} slots)",
                request.handle,
                slots.in_flight.len() + 1,
                self.limit
            );
            slots.in_flight.insert(request.handle.clone());
            slots.rotation.push_back(id);
            return Claim::Dispatch(request);
        }

        earliest.map_or(Claim::Idle, Claim::Backoff)
    }
}
