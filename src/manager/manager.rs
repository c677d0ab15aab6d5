use super::config::ManagerConfig;
use super::engine::{Effects, Engine};
use crate::backend::TransferEventSink;
use crate::chunk::{Chunk, ChunkLedger};
use crate::error::{Error, Result};
use crate::events::{ItemDelegate, Notice};
use crate::item::registry::ItemEntry;
use crate::item::{Item, ItemState, Track};
use crate::recovery::{self, RecoveryReport};
use crate::resolver::estimate_size;
use crate::store::Store;
use crate::utils::paths::{item_dir, items_dir};

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

/// Public facade of the download orchestration engine.
///
/// A manager is created through
/// [`ContentManagerBuilder`](crate::manager::ContentManagerBuilder) and is
/// cheap to clone: clones share the same engine.
///
/// ```rust,no_run
/// # use dtg::{ContentManager, ItemState};
/// # async fn example(manager: ContentManager) -> dtg::Result<()> {
/// let report = manager.start().await?;
/// println!("recovered {} items", report.items_loaded);
/// manager.resume_interrupted_items()?;
///
/// let url = "https://cdn.example.com/movie/master.m3u8".parse().unwrap();
/// if manager.add_item("movie", &url)?.is_some() {
///     let (_item, track) = manager.load_item_metadata("movie", Some(2_000_000)).await?;
///     println!("selected {} bps", track.bitrate);
///     manager.start_item("movie")?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ContentManager {
    engine: Arc<Engine>,
}

impl fmt::Debug for ContentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentManager")
            .field("config", &self.engine.config)
            .field("session_id", &self.engine.backend.session_id())
            .field("started", &self.engine.is_running())
            .finish()
    }
}

impl ContentManager {
    pub(crate) fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Gets the configuration of the manager.
    pub fn config(&self) -> &ManagerConfig {
        &self.engine.config
    }

    /// Gets the root directory of the chunk files.
    pub fn storage_path(&self) -> &Path {
        &self.engine.config.storage_path
    }

    /// Gets the maximum number of concurrent chunk transfers.
    pub fn max_concurrent_downloads(&self) -> usize {
        self.engine.scheduler.limit()
    }

    /// Gets the number of retries of a failed chunk.
    pub fn max_retries(&self) -> u32 {
        self.engine.retry.max_retries
    }

    /// Gets the delay before the first retry of a chunk.
    pub fn retry_backoff(&self) -> Duration {
        self.engine.retry.backoff
    }

    /// Gets the session identifier of the transfer backend.
    pub fn session_id(&self) -> &str {
        self.engine.backend.session_id()
    }

    /// Returns `true` between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_started(&self) -> bool {
        self.engine.is_running()
    }

    /// Number of chunk transfers currently holding a slot.
    pub fn active_transfers(&self) -> usize {
        self.engine.scheduler.in_flight()
    }

    /// Replace the delegate receiving item events.
    pub fn set_delegate(&self, delegate: Option<Arc<dyn ItemDelegate>>) {
        self.engine.notifier.set_delegate(delegate);
    }

    /// Load the persisted items, reconcile them with the transfer backend
    /// and start consuming transfer results.
    ///
    /// Items that were in progress are not dispatched until
    /// [`resume_interrupted_items`](Self::resume_interrupted_items) is called.
    pub async fn start(&self) -> Result<RecoveryReport> {
        let engine = &self.engine;
        if engine.is_running() {
            return Err(Error::Internal(String::from(
                "the content manager is already started",
            )));
        }

        tokio::fs::create_dir_all(items_dir(&engine.config.storage_path)).await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        engine.backend.attach(TransferEventSink::new(sender));

        let report = recovery::recover(engine).await?;
        engine.listen(receiver);

        info!(
            "Content manager started at {:?} ({} items)",
            engine.config.storage_path, report.items_loaded
        );
        Ok(report)
    }

    /// Stop dispatching chunks and consuming transfer results.
    ///
    /// Transfers already handed to the backend are left running; their
    /// results are picked up by the next [`start`](Self::start) or by
    /// [`handle_events_for_background_session`](Self::handle_events_for_background_session).
    pub fn stop(&self) {
        if self.engine.is_running() {
            self.engine.halt();
            info!("Content manager stopped");
        }
    }

    /// Items in `state`, ordered by id.
    pub fn items_by_state(&self, state: ItemState) -> Vec<Item> {
        self.engine.registry.list_by_state(state)
    }

    /// Snapshot of an item.
    pub fn item_by_id(&self, id: &str) -> Option<Item> {
        self.engine.registry.get(id)
    }

    /// Snapshot of an item's chunks, in sequence order.
    pub fn item_chunks(&self, id: &str) -> Result<Vec<Chunk>> {
        let shared = self.engine.registry.require(id)?;
        let entry = shared.lock();
        Ok(entry.ledger.chunks().to_vec())
    }

    /// Register a new item in the `new` state.
    ///
    /// Returns `None` if an item with this id already exists. The id must
    /// not be empty.
    pub fn add_item(&self, id: &str, url: &Url) -> Result<Option<Item>> {
        self.engine.require_running()?;
        if id.is_empty() {
            return Err(Error::InvalidId(id.to_string()));
        }
        match self.engine.registry.create(id, url) {
            Ok(item) => {
                info!("Added item {} from {}", id, url);
                Ok(Some(item))
            }
            Err(Error::DuplicateId(_)) => {
                debug!("Item {} already exists", id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve the track and chunk list of a `new` item.
    ///
    /// On success the item is `metadataLoaded` and the selected track is
    /// returned alongside it. If the resolver fails the item stays `new`.
    pub async fn load_item_metadata(
        &self,
        id: &str,
        preferred_bitrate: Option<u64>,
    ) -> Result<(Item, Track)> {
        let engine = &self.engine;
        engine.require_running()?;

        let remote_url = {
            let shared = engine.registry.require(id)?;
            let entry = shared.lock();
            expect_new(&entry, id)?;
            entry.item.remote_url.clone()
        };

        let (track, descriptors) = engine
            .resolver
            .resolve_tracks(&remote_url, preferred_bitrate)
            .await
            .map_err(|e| {
                warn!("Cannot resolve tracks of item {}: {}", id, e);
                Error::MetadataLoadFailed {
                    id: id.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let shared = engine.registry.require(id)?;
        let (item, notice) = {
            let mut entry = shared.lock();
            if entry.is_removed() {
                return Err(Error::ItemNotFound(id.to_string()));
            }
            expect_new(&entry, id)?;

            let estimated_size = estimate_size(&track, &descriptors);
            let ledger = ChunkLedger::from_descriptors(id, descriptors);
            let store = engine.store.as_ref();
            let notice = ledger
                .persist_all(store)
                .and_then(|()| {
                    engine.machine.transition_with(
                        &mut entry,
                        ItemState::MetadataLoaded,
                        "load metadata of",
                        |item| {
                            item.selected_track = Some(track.clone());
                            item.estimated_size = estimated_size;
                        },
                    )
                })
                .inspect_err(|_| discard_records(store, &ledger))?;

            debug!("Item {} has {} chunks", id, ledger.len());
            entry.ledger = ledger;
            (entry.item.clone(), notice)
        };

        engine.notifier.emit(notice);
        Ok((item, track))
    }

    /// Start or restart downloading an item.
    ///
    /// Allowed from `metadataLoaded`, `paused` and `failed`. Restarting a
    /// failed item gives its failed chunks a fresh retry budget.
    pub fn start_item(&self, id: &str) -> Result<()> {
        let engine = &self.engine;
        engine.require_running()?;
        let shared = engine.registry.require(id)?;

        let mut effects = Effects::default();
        {
            let mut entry = shared.lock();
            let state = entry.item.state;
            match state {
                ItemState::MetadataLoaded | ItemState::Paused => {}
                ItemState::Failed => entry.ledger.restart_failed(engine.store.as_ref())?,
                state => {
                    return Err(Error::InvalidState {
                        id: id.to_string(),
                        state,
                        action: "start",
                    })
                }
            }
            effects.notices.push(engine.machine.transition(
                &mut entry,
                ItemState::InProgress,
                "start",
            )?);
            if let Some(notice) = engine.machine.check_completion(&mut entry)? {
                effects.notices.push(notice);
            }
            if entry.item.state == ItemState::InProgress {
                effects.admit = Some(id.to_string());
            }
        }

        engine.settle(effects);
        engine.pump();
        Ok(())
    }

    /// Pause an item in progress.
    ///
    /// Chunks already transferring are allowed to finish and count; no new
    /// chunk of the item is dispatched.
    pub fn pause_item(&self, id: &str) -> Result<()> {
        let engine = &self.engine;
        engine.require_running()?;
        let shared = engine.registry.require(id)?;

        let notice = {
            let mut entry = shared.lock();
            engine.machine.transition(&mut entry, ItemState::Paused, "pause")?
        };
        engine.notifier.emit(notice);
        Ok(())
    }

    /// Delete an item, its records and its chunk files.
    ///
    /// Transfers in flight are cancelled. Their late results are discarded.
    pub fn remove_item(&self, id: &str) -> Result<()> {
        let engine = &self.engine;
        engine.require_running()?;
        let shared = engine.registry.require(id)?;

        let in_flight = {
            let mut entry = shared.lock();
            if entry.is_removed() {
                return Err(Error::ItemNotFound(id.to_string()));
            }
            let in_flight = entry.ledger.active_handles();
            engine.registry.delete(&mut entry)?;
            in_flight
        };

        for handle in &in_flight {
            engine.backend.cancel(handle);
            engine.scheduler.release(handle);
        }
        info!("Removed item {}", id);
        engine.notifier.emit(Notice::state(id, ItemState::Removed));

        let directory = item_dir(&engine.config.storage_path, id);
        match std::fs::remove_dir_all(&directory) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Cannot delete chunk files of item {} at {:?}: {}", id, directory, e);
                Err(Error::StorageFailure(format!(
                    "chunk files of removed item {} remain at {:?}: {}",
                    id, directory, e
                )))
            }
        }
    }

    /// Playback URL of a completed item, `None` for any other state.
    pub fn item_playback_url(&self, id: &str) -> Result<Option<Url>> {
        let shared = self.engine.registry.require(id)?;
        let (item, chunks) = {
            let entry = shared.lock();
            if entry.item.state != ItemState::Completed {
                return Ok(None);
            }
            (entry.item.clone(), entry.ledger.chunks().to_vec())
        };
        self.engine.playback.playback_url(&item, &chunks)
    }

    /// Re-admit every item in progress to the scheduler.
    ///
    /// Calling it again is harmless: admitted items are not admitted twice
    /// and chunks already transferring are not dispatched again. Returns the
    /// number of items in progress.
    pub fn resume_interrupted_items(&self) -> Result<usize> {
        let engine = &self.engine;
        engine.require_running()?;

        let items = engine.registry.list_by_state(ItemState::InProgress);
        for item in &items {
            if engine.scheduler.admit(&item.id) {
                debug!("Resuming item {}", item.id);
            }
        }
        engine.pump();
        Ok(items.len())
    }

    /// Apply the transfer results the backend kept for `session_id` while
    /// nobody was consuming them, then call `on_drained`.
    ///
    /// `on_drained` is called exactly once, also when the manager is not
    /// started. Returns the number of results drained.
    pub async fn handle_events_for_background_session<F>(
        &self,
        session_id: &str,
        on_drained: F,
    ) -> Result<usize>
    where
        F: FnOnce() + Send,
    {
        let engine = &self.engine;
        if let Err(e) = engine.require_running() {
            on_drained();
            return Err(e);
        }

        let events = engine.backend.drain_background_events(session_id).await;
        let drained = events.len();
        debug!("Drained {} results of session {}", drained, session_id);
        for event in events {
            engine.apply_event(event);
        }
        engine.pump();

        on_drained();
        Ok(drained)
    }
}

fn expect_new(entry: &ItemEntry, id: &str) -> Result<()> {
    match entry.item.state {
        ItemState::New => Ok(()),
        state => Err(Error::InvalidState {
            id: id.to_string(),
            state,
            action: "load metadata of",
        }),
    }
}

fn discard_records(store: &dyn Store, ledger: &ChunkLedger) {
    if let Err(e) = ledger.delete_all(store) {
        warn!("Cannot discard chunk records: {}", e);
    }
}
