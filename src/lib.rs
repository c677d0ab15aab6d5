//! dtg is a crate orchestrating the download of streaming media items for
//! offline playback.
//!
//! An item is a remote manifest URL. Once its track and chunk list are
//! resolved, the [`ContentManager`] downloads every chunk under a global
//! concurrency cap, tracks per-item progress and state, persists everything it
//! learns so that a restarted process picks up where the previous one
//! stopped, and finally serves the downloaded chunks through a local
//! playback URL.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dtg::resolver::{BoxError, TrackResolver};
//! use dtg::{ChunkDescriptor, ContentManagerBuilder, Error, Track};
//! use url::Url;
//!
//! struct Resolver;
//!
//! #[async_trait::async_trait]
//! impl TrackResolver for Resolver {
//!     async fn resolve_tracks(
//!         &self,
//!         item_url: &Url,
//!         _preferred_bitrate: Option<u64>,
//!     ) -> Result<(Track, Vec<ChunkDescriptor>), BoxError> {
//!         let chunks = (0..3)
//!             .map(|i| item_url.join(&format!("seg-{}.ts", i)).map(ChunkDescriptor::new))
//!             .collect::<Result<_, _>>()?;
//!         Ok((Track::new(Some(1280), Some(720), 2_000_000), chunks))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Error> {
//! let manager = ContentManagerBuilder::new(Resolver)
//!     .storage_path("offline")
//!     .max_concurrent_downloads(4)
//!     .build()?;
//! manager.start().await?;
//! manager.resume_interrupted_items()?;
//!
//! let url = Url::parse("https://cdn.example.com/movie/master.m3u8").unwrap();
//! manager.add_item("movie", &url)?;
//! manager.load_item_metadata("movie", None).await?;
//! manager.start_item("movie")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`manager`] - the [`ContentManager`] facade, its builder and configuration
//! - [`item`] - items, tracks and their lifecycle states
//! - [`chunk`] - chunks and the per-item chunk ledger
//! - [`lifecycle`] - the item state transition table
//! - [`scheduler`] - the retry policy of the bounded chunk dispatcher
//! - [`recovery`] - start-up reconciliation of persisted state
//! - [`backend`] - the transfer backend interface and its HTTP implementation
//! - [`resolver`] - the track resolver interface
//! - [`playback`] - the playback resolver interface and playlist writer
//! - [`store`] - the record store interface, in-memory and file stores
//! - [`events`] - the item delegate
//! - [`error`] - centralized error handling with the `Error` enum
//! - [`http`] - HTTP client setup
//! - [`progress`] - a terminal progress display delegate
//! - [`utils`] - shared utility functions

pub mod backend;
pub mod chunk;
pub mod error;
pub mod events;
pub mod http;
pub mod item;
pub mod lifecycle;
pub mod manager;
pub mod playback;
pub mod progress;
pub mod recovery;
pub mod resolver;
pub mod scheduler;
pub mod store;
pub mod utils;

pub use backend::{
    Delivery, HttpTransferBackend, TransferBackend, TransferError, TransferEvent,
    TransferEventSink, TransferHandle, TransferRequest,
};
pub use chunk::{Chunk, ChunkDescriptor, ChunkLedger, ChunkStatus};
pub use error::{Error, Result};
pub use events::ItemDelegate;
pub use http::{create_http_client, HttpClientConfig};
pub use item::{Item, ItemState, Track};
pub use manager::{ContentManager, ContentManagerBuilder, ManagerConfig};
pub use playback::{PlaybackResolver, PlaylistPlayback};
pub use progress::{ProgressBarOpts, ProgressDelegate, StyleOptions};
pub use recovery::RecoveryReport;
pub use resolver::TrackResolver;
pub use scheduler::RetryPolicy;
pub use store::{FileStore, MemoryStore, Store};
pub use utils::content_length::{
    extract_content_length, get_content_length, parse_content_range_total,
};
