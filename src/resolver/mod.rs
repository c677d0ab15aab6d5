//! Track resolver interface.
//!
//! Manifest parsing is not part of this crate: the host application supplies
//! a [`TrackResolver`] that reads an item's manifest, selects a track and
//! lists the chunks of that track in playback order.

use crate::chunk::ChunkDescriptor;
use crate::item::Track;

use async_trait::async_trait;
use std::error;
use url::Url;

/// Error type returned by resolvers.
pub type BoxError = Box<dyn error::Error + Send + Sync>;

/// Resolves an item's remote URL into a track and its chunks.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Select a track for `item_url`, preferring the one closest to
    /// `preferred_bitrate` when given, and list its chunks.
    async fn resolve_tracks(
        &self,
        item_url: &Url,
        preferred_bitrate: Option<u64>,
    ) -> Result<(Track, Vec<ChunkDescriptor>), BoxError>;
}

/// Estimate an item's size from its chunk list.
///
/// The sum of the announced sizes when every chunk announces one, otherwise
/// `bitrate × duration / 8` when every chunk has a duration.
pub fn estimate_size(track: &Track, chunks: &[ChunkDescriptor]) -> Option<u64> {
    if let Some(total) = chunks
        .iter()
        .map(|c| c.byte_size)
        .sum::<Option<u64>>()
    {
        return Some(total);
    }

    chunks
        .iter()
        .map(|c| c.duration)
        .sum::<Option<f64>>()
        .map(|seconds| (track.bitrate as f64 * seconds / 8.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(i: usize) -> ChunkDescriptor {
        ChunkDescriptor::new(Url::parse(&format!("https://cdn.example.com/{}.ts", i)).unwrap())
    }

    #[test]
    fn test_estimate_from_sizes() {
        let track = Track::new(None, None, 1_000_000);
        let chunks = vec![
            descriptor(0).with_size(100).with_duration(4.0),
            descriptor(1).with_size(50),
        ];
        assert_eq!(estimate_size(&track, &chunks), Some(150));
    }

    #[test]
    fn test_estimate_from_bitrate() {
        let track = Track::new(Some(1280), Some(720), 800_000);
        let chunks = vec![
            descriptor(0).with_duration(6.0),
            descriptor(1).with_size(10).with_duration(4.0),
        ];
        assert_eq!(estimate_size(&track, &chunks), Some(1_000_000));
    }

    #[test]
    fn test_estimate_unknown() {
        let track = Track::new(None, None, 800_000);
        assert_eq!(estimate_size(&track, &[descriptor(0)]), None);
    }
}
