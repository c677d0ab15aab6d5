//! Chunk module containing the chunk model and the per-item chunk ledger.
//!
//! - [`model`] - [`Chunk`], [`ChunkStatus`] and [`ChunkDescriptor`]
//! - [`ledger`] - [`ChunkLedger`], the ordered chunk list of one item

pub mod ledger;
pub mod model;

pub use ledger::ChunkLedger;
pub use model::{Chunk, ChunkDescriptor, ChunkStatus};
