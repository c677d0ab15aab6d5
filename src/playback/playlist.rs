//! Local media playlist writer.

use super::PlaybackResolver;
use crate::chunk::Chunk;
use crate::error::{Error, Result};
use crate::item::Item;

use std::fmt::Write as _;
use std::fs;
use url::Url;

/// Name of the playlist written next to the chunk files.
pub const PLAYLIST_NAME: &str = "index.m3u8";

/// Duration assumed for chunks without one.
const DEFAULT_DURATION: f64 = 10.0;

/// Writes an HLS media playlist listing the chunk files.
#[derive(Debug, Clone, Default)]
pub struct PlaylistPlayback;

impl PlaylistPlayback {
    /// Creates a new [`PlaylistPlayback`].
    pub fn new() -> Self {
        Self
    }

    /// Render the playlist for `chunks`.
    ///
    /// Chunk files are referenced by file name, relative to the playlist.
    pub fn render(chunks: &[Chunk]) -> String {
        let durations: Vec<f64> = chunks
            .iter()
            .map(|c| c.duration.unwrap_or(DEFAULT_DURATION))
            .collect();
        let target = durations.iter().copied().fold(0.0, f64::max).ceil() as u64;

        let mut playlist = String::new();
        playlist.push_str("#EXTM3U\n#EXT-X-VERSION:3\n");
        let _ = writeln!(playlist, "#EXT-X-TARGETDURATION:{}", target.max(1));
        playlist.push_str("#EXT-X-MEDIA-SEQUENCE:0\n#EXT-X-PLAYLIST-TYPE:VOD\n");
        for (chunk, duration) in chunks.iter().zip(durations) {
            let name = chunk
                .local_path
                .as_ref()
                .and_then(|path| path.file_name())
                .and_then(|name| name.to_str())
                .unwrap_or_default();
            let _ = writeln!(playlist, "#EXTINF:{:.3},\n{}", duration, name);
        }
        playlist.push_str("#EXT-X-ENDLIST\n");
        playlist
    }
}

impl PlaybackResolver for PlaylistPlayback {
    fn playback_url(&self, item: &Item, chunks: &[Chunk]) -> Result<Option<Url>> {
        let Some(directory) = chunks
            .first()
            .and_then(|c| c.local_path.as_ref())
            .and_then(|path| path.parent())
        else {
            return Ok(None);
        };

        let path = directory.join(PLAYLIST_NAME);
        fs::write(&path, Self::render(chunks))?;

        Url::from_file_path(&path).map(Some).map_err(|_| {
            Error::InvalidUrl(format!(
                "playlist of item {} is not an absolute path: {:?}",
                item.id, path
            ))
        })
    }
}
