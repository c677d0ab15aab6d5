//! Chunk types.

use crate::backend::TransferHandle;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use url::Url;

/// Download status of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    /// Waiting to be dispatched.
    Pending,
    /// Handed to the transfer backend.
    Active,
    /// Stored on disk.
    Done,
    /// Exhausted its retry budget.
    Failed,
}

/// One chunk as produced by a [`TrackResolver`](crate::resolver::TrackResolver).
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDescriptor {
    /// Remote location of the chunk.
    pub url: Url,
    /// Size in bytes, if the manifest announces it.
    pub byte_size: Option<u64>,
    /// Playback duration in seconds, if known.
    pub duration: Option<f64>,
}

impl ChunkDescriptor {
    /// Creates a descriptor with no size or duration information.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            byte_size: None,
            duration: None,
        }
    }

    /// Attach the announced size.
    pub fn with_size(self, byte_size: u64) -> Self {
        Self {
            byte_size: Some(byte_size),
            ..self
        }
    }

    /// Attach the playback duration.
    pub fn with_duration(self, duration: f64) -> Self {
        Self {
            duration: Some(duration),
            ..self
        }
    }
}

/// One independently downloadable unit of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Id of the owning item.
    pub item_id: String,
    /// Position of the chunk in playback order.
    pub sequence_index: u32,
    /// Remote location.
    pub url: Url,
    /// Size in bytes. Set to the bytes actually written once done.
    pub byte_size: Option<u64>,
    /// Playback duration in seconds.
    pub duration: Option<f64>,
    /// Download status.
    pub status: ChunkStatus,
    /// Location of the stored file once done.
    pub local_path: Option<PathBuf>,
    /// Attempt token of the latest dispatch.
    pub attempt: u32,
    /// Consecutive failed attempts.
    pub failures: u32,
    /// Earliest time a retry may be dispatched.
    #[serde(skip)]
    pub(crate) retry_at: Option<Instant>,
}

impl Chunk {
    /// Creates a pending chunk from a descriptor.
    pub fn new(item_id: &str, sequence_index: u32, descriptor: ChunkDescriptor) -> Self {
        Self {
            item_id: String::from(item_id),
            sequence_index,
            url: descriptor.url,
            byte_size: descriptor.byte_size,
            duration: descriptor.duration,
            status: ChunkStatus::Pending,
            local_path: None,
            attempt: 0,
            failures: 0,
            retry_at: None,
        }
    }

    /// Handle of the latest dispatched attempt.
    pub fn handle(&self) -> TransferHandle {
        TransferHandle::new(&self.item_id, self.sequence_index, self.attempt)
    }

    /// Returns `true` if `handle` is the attempt currently in flight.
    pub fn is_current(&self, handle: &TransferHandle) -> bool {
        self.status == ChunkStatus::Active
            && self.attempt == handle.attempt
            && self.sequence_index == handle.sequence_index
            && self.item_id == handle.item_id
    }

    /// Returns `true` if the chunk may be dispatched at `now`.
    pub(crate) fn is_eligible(&self, now: Instant) -> bool {
        self.status == ChunkStatus::Pending && self.retry_at.map_or(true, |at| at <= now)
    }
}
