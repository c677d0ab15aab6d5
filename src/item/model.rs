//! Item, track and item state types.
//!
//! An [`Item`] is one downloadable media asset, tracked under a unique id
//! assigned by the caller. Its [`ItemState`] is serialized as one of the
//! literal tokens `new`, `metadataLoaded`, `inProgress`, `paused`,
//! `completed`, `failed` and `removed`.
//!
//! # Examples
//!
//! ```rust
//! use dtg::item::ItemState;
//! use std::str::FromStr;
//!
//! let state = ItemState::from_str("inProgress").unwrap();
//! assert_eq!(state, ItemState::InProgress);
//! assert_eq!(state.to_string(), "inProgress");
//! ```

use crate::error::Error;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Lifecycle state of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemState {
    /// Item was just added, only the id and the URL are known.
    New,
    /// Track information and the chunk list are available.
    MetadataLoaded,
    /// Chunks are being dispatched.
    InProgress,
    /// Paused by the application; in-flight chunks may still finish.
    Paused,
    /// Every chunk is downloaded.
    Completed,
    /// A chunk exhausted its retry budget.
    Failed,
    /// Transient value announced when an item is deleted. Never persisted.
    Removed,
}

impl ItemState {
    /// All states, in lifecycle order.
    pub const ALL: [ItemState; 7] = [
        ItemState::New,
        ItemState::MetadataLoaded,
        ItemState::InProgress,
        ItemState::Paused,
        ItemState::Completed,
        ItemState::Failed,
        ItemState::Removed,
    ];

    /// The literal token for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::New => "new",
            ItemState::MetadataLoaded => "metadataLoaded",
            ItemState::InProgress => "inProgress",
            ItemState::Paused => "paused",
            ItemState::Completed => "completed",
            ItemState::Failed => "failed",
            ItemState::Removed => "removed",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| Error::Internal(format!("unknown item state \"{}\"", s)))
    }
}

/// Information about the selected video track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Width in pixels.
    pub width: Option<u32>,
    /// Height in pixels.
    pub height: Option<u32>,
    /// Bitrate in bits per second.
    pub bitrate: u64,
}

impl Track {
    /// Creates a new [`Track`].
    pub fn new(width: Option<u32>, height: Option<u32>, bitrate: u64) -> Self {
        Self {
            width,
            height,
            bitrate,
        }
    }
}

/// A downloadable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// The item's unique id.
    pub id: String,
    /// The item's remote URL.
    pub remote_url: Url,
    /// The item's current state.
    pub state: ItemState,
    /// Estimated size of the item in bytes.
    pub estimated_size: Option<u64>,
    /// Downloaded size in bytes.
    pub downloaded_size: u64,
    /// Track chosen when the metadata was loaded.
    pub selected_track: Option<Track>,
}

impl Item {
    /// Creates a new [`Item`] in the `new` state.
    pub fn new(id: &str, remote_url: &Url) -> Self {
        Self {
            id: String::from(id),
            remote_url: remote_url.clone(),
            state: ItemState::New,
            estimated_size: None,
            downloaded_size: 0,
            selected_track: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_tokens_round_trip() {
        for state in ItemState::ALL {
            assert_eq!(ItemState::from_str(state.as_str()).unwrap(), state);
        }
        assert!(ItemState::from_str("downloading").is_err());
    }

    #[test]
    fn test_state_serializes_as_token() {
        let json = serde_json::to_string(&ItemState::MetadataLoaded).unwrap();
        assert_eq!(json, "\"metadataLoaded\"");
    }

    #[test]
    fn test_new_item() {
        let url = Url::parse("https://cdn.example.com/movie/master.m3u8").unwrap();
        let item = Item::new("movie", &url);
        assert_eq!(item.state, ItemState::New);
        assert_eq!(item.downloaded_size, 0);
        assert!(item.estimated_size.is_none());
        assert!(item.selected_track.is_none());
    }
}
