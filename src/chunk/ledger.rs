//! Per-item chunk ledger.
//!
//! The [`ChunkLedger`] owns the ordered chunk list of one item together with
//! the download status of every chunk. Each mutation writes the chunk record
//! to the [`Store`] first and only then replaces the in-memory copy, so a
//! failed write leaves the ledger untouched.

use super::model::{Chunk, ChunkDescriptor, ChunkStatus};
use crate::backend::{Delivery, TransferHandle};
use crate::error::{Error, Result};
use crate::store::{chunk_key, put_record, Store};

use std::time::Instant;

/// Ordered chunk list of one item.
#[derive(Debug, Clone, Default)]
pub struct ChunkLedger {
    chunks: Vec<Chunk>,
}

impl ChunkLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates pending chunks from resolver output, indexed by position.
    pub fn from_descriptors(item_id: &str, descriptors: Vec<ChunkDescriptor>) -> Self {
        let chunks = descriptors
            .into_iter()
            .enumerate()
            .map(|(index, descriptor)| Chunk::new(item_id, index as u32, descriptor))
            .collect();
        Self { chunks }
    }

    /// Rebuilds a ledger from persisted records.
    pub fn from_records(mut chunks: Vec<Chunk>) -> Self {
        chunks.sort_by_key(|c| c.sequence_index);
        Self { chunks }
    }

    /// All chunks in sequence order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns `true` if the item has no chunk.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The chunk with the given sequence index.
    pub fn get(&self, index: u32) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.sequence_index == index)
    }

    /// Number of chunks in `status`.
    pub fn count(&self, status: ChunkStatus) -> usize {
        self.chunks.iter().filter(|c| c.status == status).count()
    }

    /// Sum of the byte sizes of the done chunks.
    pub fn downloaded_bytes(&self) -> u64 {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Done)
            .map(|c| c.byte_size.unwrap_or(0))
            .sum()
    }

    /// Returns `true` if every chunk is done.
    pub fn all_done(&self) -> bool {
        self.chunks.iter().all(|c| c.status == ChunkStatus::Done)
    }

    /// Returns `true` if at least one chunk waits for dispatch.
    pub fn has_pending(&self) -> bool {
        self.chunks.iter().any(|c| c.status == ChunkStatus::Pending)
    }

    /// Lowest-index pending chunk that may be dispatched at `now`.
    pub fn next_eligible(&self, now: Instant) -> Option<u32> {
        self.chunks
            .iter()
            .find(|c| c.is_eligible(now))
            .map(|c| c.sequence_index)
    }

    /// Earliest backoff deadline after `now` among the pending chunks.
    pub fn next_retry_at(&self, now: Instant) -> Option<Instant> {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Pending)
            .filter_map(|c| c.retry_at)
            .filter(|at| *at > now)
            .min()
    }

    /// Handles of the chunks currently in flight.
    pub fn active_handles(&self) -> Vec<TransferHandle> {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Active)
            .map(Chunk::handle)
            .collect()
    }

    /// Returns `true` if `handle` is the attempt in flight for its chunk.
    pub fn is_current(&self, handle: &TransferHandle) -> bool {
        self.get(handle.sequence_index)
            .is_some_and(|c| c.is_current(handle))
    }

    /// Write every chunk record.
    pub(crate) fn persist_all(&self, store: &dyn Store) -> Result<()> {
        for chunk in &self.chunks {
            put_record(store, &chunk_key(&chunk.item_id, chunk.sequence_index), chunk)?;
        }
        Ok(())
    }

    /// Delete every chunk record. Stops at the first failure.
    pub(crate) fn delete_all(&self, store: &dyn Store) -> Result<()> {
        for chunk in &self.chunks {
            store.delete(&chunk_key(&chunk.item_id, chunk.sequence_index))?;
        }
        Ok(())
    }

    fn update<F>(&mut self, store: &dyn Store, index: u32, apply: F) -> Result<&Chunk>
    where
        F: FnOnce(&mut Chunk),
    {
        let slot = self
            .chunks
            .iter_mut()
            .find(|c| c.sequence_index == index)
            .ok_or_else(|| Error::Internal(format!("unknown chunk index {}", index)))?;

        let mut next = slot.clone();
        apply(&mut next);
        put_record(store, &chunk_key(&next.item_id, next.sequence_index), &next)?;
        *slot = next;
        Ok(&*slot)
    }

    /// Mark a pending chunk active under a fresh attempt token.
    pub(crate) fn mark_active(&mut self, store: &dyn Store, index: u32) -> Result<Chunk> {
        self.update(store, index, |c| {
            c.status = ChunkStatus::Active;
            c.attempt += 1;
            c.retry_at = None;
        })
        .cloned()
    }

    /// Mark a chunk done and return the number of bytes it adds.
    pub(crate) fn mark_done(
        &mut self,
        store: &dyn Store,
        index: u32,
        delivery: Delivery,
    ) -> Result<u64> {
        let chunk = self.update(store, index, |c| {
            c.status = ChunkStatus::Done;
            c.byte_size = Some(delivery.bytes_written);
            c.local_path = Some(delivery.local_path);
            c.failures = 0;
        })?;
        Ok(chunk.byte_size.unwrap_or(0))
    }

    /// Put a chunk back in the queue after a failed attempt.
    pub(crate) fn schedule_retry(
        &mut self,
        store: &dyn Store,
        index: u32,
        failures: u32,
        retry_at: Instant,
    ) -> Result<()> {
        self.update(store, index, |c| {
            c.status = ChunkStatus::Pending;
            c.failures = failures;
            c.retry_at = Some(retry_at);
        })
        .map(|_| ())
    }

    /// Mark a chunk as having exhausted its retry budget.
    pub(crate) fn mark_failed(&mut self, store: &dyn Store, index: u32, failures: u32) -> Result<()> {
        self.update(store, index, |c| {
            c.status = ChunkStatus::Failed;
            c.failures = failures;
        })
        .map(|_| ())
    }

    /// Return an active or failed chunk to the queue, keeping its failures.
    pub(crate) fn reset_to_pending(&mut self, store: &dyn Store, index: u32) -> Result<()> {
        self.update(store, index, |c| {
            c.status = ChunkStatus::Pending;
            c.retry_at = None;
        })
        .map(|_| ())
    }

    /// Reset a done chunk whose file disappeared.
    pub(crate) fn forget_delivery(&mut self, store: &dyn Store, index: u32) -> Result<()> {
        self.update(store, index, |c| {
            c.status = ChunkStatus::Pending;
            c.local_path = None;
        })
        .map(|_| ())
    }

    /// Give every failed chunk a fresh retry budget.
    pub(crate) fn restart_failed(&mut self, store: &dyn Store) -> Result<()> {
        let failed: Vec<u32> = self
            .chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Failed)
            .map(|c| c.sequence_index)
            .collect();
        for index in failed {
            self.update(store, index, |c| {
                c.status = ChunkStatus::Pending;
                c.failures = 0;
                c.retry_at = None;
            })?;
        }
        Ok(())
    }

    /// Revert an active chunk to pending without persisting.
    ///
    /// Used when the store refuses a write: the persisted record still says
    /// active, which recovery resolves the same way.
    pub(crate) fn revert_volatile(&mut self, index: u32) {
        if let Some(chunk) = self.chunks.iter_mut().find(|c| c.sequence_index == index) {
            chunk.status = ChunkStatus::Pending;
        }
    }
}
