//! Playback resolver interface.
//!
//! Once an item is completed, a [`PlaybackResolver`] turns its chunk files
//! into a URL a player can open. The default [`PlaylistPlayback`] writes a
//! local media playlist next to the chunks and returns its `file://` URL;
//! hosts serving items through a local HTTP endpoint plug in their own.

pub mod playlist;

pub use playlist::PlaylistPlayback;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::item::Item;

use url::Url;

/// Produces the playback URL of a completed item.
pub trait PlaybackResolver: Send + Sync {
    /// `chunks` are the item's done chunks in sequence order.
    fn playback_url(&self, item: &Item, chunks: &[Chunk]) -> Result<Option<Url>>;
}
