//! Builder for [`ContentManager`].
//!
//! Only the track resolver is mandatory. Without further setup the manager
//! stores its records in a [`FileStore`] under `<storage_path>/records`,
//! transfers chunks with the [`HttpTransferBackend`] and serves completed
//! items through a [`PlaylistPlayback`].
//!
//! ```rust,no_run
//! use dtg::manager::ContentManagerBuilder;
//! use dtg::resolver::{BoxError, TrackResolver};
//! use dtg::{ChunkDescriptor, Track};
//! use std::time::Duration;
//! use url::Url;
//!
//! struct SingleChunk;
//!
//! #[async_trait::async_trait]
//! impl TrackResolver for SingleChunk {
//!     async fn resolve_tracks(
//!         &self,
//!         item_url: &Url,
//!         _preferred_bitrate: Option<u64>,
//!     ) -> Result<(Track, Vec<ChunkDescriptor>), BoxError> {
//!         Ok((Track::new(None, None, 800_000), vec![ChunkDescriptor::new(item_url.clone())]))
//!     }
//! }
//!
//! # fn example() -> dtg::Result<()> {
//! let manager = ContentManagerBuilder::new(SingleChunk)
//!     .storage_path("./offline")
//!     .max_concurrent_downloads(6)
//!     .retry_backoff(Duration::from_secs(1))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use super::config::ManagerConfig;
use super::engine::Engine;
use super::manager::ContentManager;
use crate::backend::{HttpTransferBackend, TransferBackend};
use crate::error::{Error, Result};
use crate::events::{EventNotifier, ItemDelegate};
use crate::playback::{PlaybackResolver, PlaylistPlayback};
use crate::resolver::TrackResolver;
use crate::store::{FileStore, Store};
use crate::utils::paths::RECORDS_DIR;

use reqwest::header::{HeaderMap, HeaderValue, IntoHeaderName};
use reqwest::Proxy;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A builder used to create a [`ContentManager`].
pub struct ContentManagerBuilder {
    config: ManagerConfig,
    resolver: Arc<dyn TrackResolver>,
    backend: Option<Arc<dyn TransferBackend>>,
    store: Option<Arc<dyn Store>>,
    playback: Option<Arc<dyn PlaybackResolver>>,
    delegate: Option<Arc<dyn ItemDelegate>>,
}

impl ContentManagerBuilder {
    /// Creates a builder with the default configuration.
    pub fn new<R>(resolver: R) -> Self
    where
        R: TrackResolver + 'static,
    {
        Self {
            config: ManagerConfig::default(),
            resolver: Arc::new(resolver),
            backend: None,
            store: None,
            playback: None,
            delegate: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the root directory of the chunk files.
    pub fn storage_path(mut self, storage_path: impl Into<PathBuf>) -> Self {
        self.config.storage_path = storage_path.into();
        self
    }

    /// Sets the maximum number of concurrent chunk transfers.
    pub fn max_concurrent_downloads(mut self, max_concurrent_downloads: usize) -> Self {
        self.config.max_concurrent_downloads = max_concurrent_downloads;
        self
    }

    /// Sets the number of retries of a failed chunk.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Sets the delay before the first retry of a chunk.
    pub fn retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.config.retry_backoff = retry_backoff;
        self
    }

    /// Sets the upper bound of the retry delay.
    pub fn max_retry_backoff(mut self, max_retry_backoff: Duration) -> Self {
        self.config.max_retry_backoff = max_retry_backoff;
        self
    }

    /// Sets the transient retries of the default HTTP backend.
    pub fn http_retries(mut self, retries: u32) -> Self {
        self.config.http.retries = retries;
        self
    }

    /// Sets the proxy of the default HTTP backend.
    pub fn proxy(mut self, proxy: Proxy) -> Self {
        self.config.http.proxy = Some(proxy);
        self
    }

    fn new_header(&self) -> HeaderMap {
        match self.config.http.headers {
            Some(ref h) => h.to_owned(),
            _ => HeaderMap::new(),
        }
    }

    /// Add the http headers.
    ///
    /// You need to pass in a `HeaderMap`, not a `HeaderName`.
    /// `HeaderMap` is a set of http headers.
    ///
    /// You can call `.headers()` multiple times and all `HeaderMap` will be merged into a single one.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        let mut new = self.new_header();
        new.extend(headers);

        self.config.http.headers = Some(new);
        self
    }

    /// Add the http header.
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        let mut new = self.new_header();

        new.insert(name, value);

        self.config.http.headers = Some(new);
        self
    }

    /// Use `backend` instead of the HTTP backend.
    pub fn backend<B>(mut self, backend: B) -> Self
    where
        B: TransferBackend + 'static,
    {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Use `store` instead of the file store.
    pub fn store<S>(mut self, store: S) -> Self
    where
        S: Store + 'static,
    {
        self.store = Some(Arc::new(store));
        self
    }

    /// Use `playback` instead of the playlist writer.
    pub fn playback<P>(mut self, playback: P) -> Self
    where
        P: PlaybackResolver + 'static,
    {
        self.playback = Some(Arc::new(playback));
        self
    }

    /// Register the delegate receiving item events.
    pub fn delegate(mut self, delegate: Arc<dyn ItemDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Create the [`ContentManager`] with the specified options.
    pub fn build(self) -> Result<ContentManager> {
        if self.config.max_concurrent_downloads == 0 {
            return Err(Error::Internal(String::from(
                "max_concurrent_downloads must be at least 1",
            )));
        }
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(FileStore::new(self.config.storage_path.join(RECORDS_DIR))),
        };
        let backend = match self.backend {
            Some(backend) => backend,
            None => Arc::new(
                HttpTransferBackend::with_config(self.config.http.clone())
                    .map_err(|e| Error::Internal(format!("cannot build the HTTP client: {}", e)))?,
            ),
        };
        let playback = self
            .playback
            .unwrap_or_else(|| Arc::new(PlaylistPlayback::new()));

        Ok(ContentManager::new(Engine::new(
            self.config,
            store,
            backend,
            self.resolver,
            playback,
            EventNotifier::new(self.delegate),
        )))
    }
}
