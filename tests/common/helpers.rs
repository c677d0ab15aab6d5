#![allow(dead_code)]

use async_trait::async_trait;
use dtg::resolver::{BoxError, TrackResolver};
use dtg::progress::{ProgressBarOpts, StyleOptions};
use dtg::{
    Chunk, ChunkDescriptor, ChunkStatus, ContentManager, ContentManagerBuilder, Error,
    HttpClientConfig, ItemDelegate, ItemState, MemoryStore, Track, TransferBackend,
    TransferError, TransferEvent, TransferEventSink, TransferHandle, TransferRequest,
};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use url::Url;

// Common test constants
pub const CHUNK_SIZE: u64 = 100;
pub const TEST_BITRATE: u64 = 1_000_000;
pub const TEST_SESSION: &str = "test.session";
pub const TEST_USER_AGENT: &str = "dtg-test/1.0";

/// Install a tracing subscriber honouring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Creates a temporary directory for testing purposes
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temporary directory")
}

/// Remote manifest URL of a test item.
pub fn item_url(id: &str) -> Url {
    Url::parse(&format!("https://cdn.example.com/{}/master.m3u8", id)).unwrap()
}

// === Resolver ===

/// Resolves every item into `chunks` chunks of [`CHUNK_SIZE`] bytes.
#[derive(Clone)]
pub struct FakeResolver {
    chunks: usize,
    failing: bool,
}

impl FakeResolver {
    pub fn new(chunks: usize) -> Self {
        Self {
            chunks,
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            chunks: 0,
            failing: true,
        }
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve_tracks(
        &self,
        item_url: &Url,
        _preferred_bitrate: Option<u64>,
    ) -> Result<(Track, Vec<ChunkDescriptor>), BoxError> {
        if self.failing {
            return Err("manifest unavailable".into());
        }
        let chunks = (0..self.chunks)
            .map(|i| {
                let url = item_url.join(&format!("seg-{}.ts", i))?;
                Ok(ChunkDescriptor::new(url)
                    .with_size(CHUNK_SIZE)
                    .with_duration(4.0))
            })
            .collect::<Result<Vec<_>, url::ParseError>>()?;
        Ok((Track::new(Some(1280), Some(720), TEST_BITRATE), chunks))
    }
}

// === Backend ===

#[derive(Default)]
struct FakeState {
    sink: Option<TransferEventSink>,
    requests: Vec<TransferRequest>,
    live: HashMap<TransferHandle, TransferRequest>,
    max_live: usize,
    cancelled: Vec<TransferHandle>,
    deferred: Vec<TransferEvent>,
    reject: bool,
}

/// Scripted transfer backend: transfers only finish when a test says so.
///
/// Clones share their state, so a test can keep a clone while the manager
/// owns another, and can hand the same "session" to a restarted manager.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request ever enqueued.
    pub fn requests(&self) -> Vec<TransferRequest> {
        self.state.lock().requests.clone()
    }

    /// Sequence indices of the requests enqueued for `id`.
    pub fn requested_indices(&self, id: &str) -> Vec<u32> {
        let mut indices: Vec<u32> = self
            .requests()
            .iter()
            .filter(|r| r.handle.item_id == id)
            .map(|r| r.handle.sequence_index)
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Transfers enqueued and not finished or cancelled, in a stable order.
    pub fn outstanding(&self) -> Vec<TransferHandle> {
        let mut handles: Vec<TransferHandle> = self.state.lock().live.keys().cloned().collect();
        handles.sort_by(|a, b| {
            (&a.item_id, a.sequence_index).cmp(&(&b.item_id, b.sequence_index))
        });
        handles
    }

    /// Highest number of simultaneously outstanding transfers seen.
    pub fn max_outstanding(&self) -> usize {
        self.state.lock().max_live
    }

    pub fn cancelled(&self) -> Vec<TransferHandle> {
        self.state.lock().cancelled.clone()
    }

    /// Make every following `enqueue` fail synchronously.
    pub fn set_reject(&self, reject: bool) {
        self.state.lock().reject = reject;
    }

    /// Write the chunk file and report success.
    pub fn complete(&self, handle: &TransferHandle) {
        let Some(request) = self.state.lock().live.remove(handle) else {
            panic!("{} is not outstanding", handle);
        };
        let size = request.expected_size.unwrap_or(CHUNK_SIZE);
        fs::create_dir_all(request.destination.parent().unwrap()).unwrap();
        fs::write(&request.destination, vec![b'x'; size as usize]).unwrap();
        self.deliver(TransferEvent::delivered(
            request.handle,
            size,
            request.destination,
        ));
    }

    /// Report a failed attempt.
    pub fn fail(&self, handle: &TransferHandle) {
        let Some(request) = self.state.lock().live.remove(handle) else {
            panic!("{} is not outstanding", handle);
        };
        self.deliver(TransferEvent::failed(
            request.handle,
            TransferError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE),
        ));
    }

    /// Report an arbitrary event, as a misbehaving session might.
    pub fn deliver(&self, event: TransferEvent) {
        let mut state = self.state.lock();
        let undelivered = match state.sink.as_ref() {
            Some(sink) => sink.deliver(event).err(),
            None => Some(event),
        };
        if let Some(event) = undelivered {
            state.deferred.push(event);
        }
    }
}

#[async_trait]
impl TransferBackend for FakeBackend {
    fn session_id(&self) -> &str {
        TEST_SESSION
    }

    fn attach(&self, sink: TransferEventSink) {
        self.state.lock().sink = Some(sink);
    }

    fn enqueue(&self, request: TransferRequest) -> Result<(), TransferError> {
        let mut state = self.state.lock();
        if state.reject {
            return Err(TransferError::Rejected("queue full".into()));
        }
        state.requests.push(request.clone());
        state.live.insert(request.handle.clone(), request);
        state.max_live = state.max_live.max(state.live.len());
        Ok(())
    }

    fn cancel(&self, handle: &TransferHandle) {
        let mut state = self.state.lock();
        state.live.remove(handle);
        state.cancelled.push(handle.clone());
    }

    async fn live_handles(&self) -> HashSet<TransferHandle> {
        let state = self.state.lock();
        state
            .live
            .keys()
            .chain(state.deferred.iter().map(|e| &e.handle))
            .cloned()
            .collect()
    }

    async fn drain_background_events(&self, session_id: &str) -> Vec<TransferEvent> {
        if session_id != TEST_SESSION {
            return Vec::new();
        }
        std::mem::take(&mut self.state.lock().deferred)
    }
}

// === Delegate ===

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Error {
        id: String,
        transfer_failed: bool,
        message: String,
    },
    Progress {
        id: String,
        downloaded: u64,
        estimated: Option<u64>,
    },
    State {
        id: String,
        state: ItemState,
    },
}

/// Delegate keeping every event it receives.
#[derive(Default)]
pub struct RecordingDelegate {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingDelegate {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn states(&self, id: &str) -> Vec<ItemState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::State { id: ref item, state } if item == id => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self, id: &str) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Progress {
                    id: ref item,
                    downloaded,
                    ..
                } if item == id => Some(downloaded),
                _ => None,
            })
            .collect()
    }

    pub fn transfer_failures(&self, id: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| {
                matches!(e, Recorded::Error { id: item, transfer_failed: true, .. } if item == id)
            })
            .count()
    }

    pub fn errors(&self, id: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Error {
                    id: ref item,
                    message,
                    ..
                } if item == id => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl ItemDelegate for RecordingDelegate {
    fn on_error(&self, id: &str, error: &Error) {
        self.events.lock().push(Recorded::Error {
            id: id.to_string(),
            transfer_failed: matches!(error, Error::TransferFailed { .. }),
            message: error.to_string(),
        });
    }

    fn on_progress(&self, id: &str, downloaded: u64, estimated: Option<u64>) {
        self.events.lock().push(Recorded::Progress {
            id: id.to_string(),
            downloaded,
            estimated,
        });
    }

    fn on_state_changed(&self, id: &str, state: ItemState) {
        self.events.lock().push(Recorded::State {
            id: id.to_string(),
            state,
        });
    }
}

// === Manager ===

/// Everything a manager test needs to observe.
pub struct Harness {
    pub manager: ContentManager,
    pub backend: FakeBackend,
    pub store: MemoryStore,
    pub delegate: Arc<RecordingDelegate>,
}

/// Build a manager on fake collaborators, with immediate retries.
pub fn harness(
    storage: &Path,
    store: MemoryStore,
    backend: FakeBackend,
    resolver: FakeResolver,
    max_concurrent_downloads: usize,
) -> Harness {
    harness_with(storage, store, backend, resolver, |builder| {
        builder.max_concurrent_downloads(max_concurrent_downloads)
    })
}

/// Like [`harness`], letting the test adjust the builder.
pub fn harness_with<F>(
    storage: &Path,
    store: MemoryStore,
    backend: FakeBackend,
    resolver: FakeResolver,
    configure: F,
) -> Harness
where
    F: FnOnce(ContentManagerBuilder) -> ContentManagerBuilder,
{
    init_tracing();
    let delegate = Arc::new(RecordingDelegate::default());
    let builder = ContentManagerBuilder::new(resolver)
        .storage_path(storage)
        .retry_backoff(Duration::ZERO)
        .store(store.clone())
        .backend(backend.clone())
        .delegate(delegate.clone());
    let manager = configure(builder)
        .build()
        .expect("Failed to build the content manager");
    Harness {
        manager,
        backend,
        store,
        delegate,
    }
}

/// Add an item, load its metadata and start it.
pub async fn add_and_start(manager: &ContentManager, id: &str) {
    manager
        .add_item(id, &item_url(id))
        .unwrap()
        .expect("item already exists");
    manager.load_item_metadata(id, None).await.unwrap();
    manager.start_item(id).unwrap();
}

pub fn state_of(manager: &ContentManager, id: &str) -> Option<ItemState> {
    manager.item_by_id(id).map(|item| item.state)
}

pub fn statuses(manager: &ContentManager, id: &str) -> Vec<ChunkStatus> {
    manager
        .item_chunks(id)
        .unwrap()
        .iter()
        .map(|c| c.status)
        .collect()
}

pub fn done_count(manager: &ContentManager, id: &str) -> usize {
    statuses(manager, id)
        .into_iter()
        .filter(|s| *s == ChunkStatus::Done)
        .count()
}

/// Sum of the sizes of the done chunks.
pub fn done_bytes(chunks: &[Chunk]) -> u64 {
    chunks
        .iter()
        .filter(|c| c.status == ChunkStatus::Done)
        .filter_map(|c| c.byte_size)
        .sum()
}

/// Poll `condition` until it holds, failing the test after a few seconds.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Let the engine process whatever it has been sent.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Finish outstanding transfers until `finished` holds. `succeed` decides
/// whether an attempt completes or fails.
pub async fn drive<D, F>(backend: &FakeBackend, mut finished: D, mut succeed: F)
where
    D: FnMut() -> bool,
    F: FnMut(&TransferHandle) -> bool,
{
    loop {
        wait_until(|| finished() || !backend.outstanding().is_empty()).await;
        if finished() {
            return;
        }
        for handle in backend.outstanding() {
            if succeed(&handle) {
                backend.complete(&handle);
            } else {
                backend.fail(&handle);
            }
        }
    }
}

// === HTTP Configuration Helpers ===

/// Creates test headers with common user agent
pub fn create_test_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(TEST_USER_AGENT));
    headers
}

/// Creates test headers with custom user agent
pub fn create_test_headers_with_agent(agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(agent).expect("Invalid header value"));
    headers
}

/// Creates a test HTTP client configuration with custom retries
pub fn create_test_http_config_with_retries(retries: u32) -> HttpClientConfig {
    HttpClientConfig {
        retries,
        proxy: None,
        headers: Some(create_test_headers()),
        timeout: Some(Duration::from_secs(5)),
    }
}

// === Progress Bar Helpers ===

/// Creates default test progress bar options
pub fn create_test_progress_opts() -> ProgressBarOpts {
    ProgressBarOpts::new(None, None, true, false)
}

/// Creates custom progress bar options with template and chars
pub fn create_custom_progress_opts(template: &str, chars: &str) -> ProgressBarOpts {
    ProgressBarOpts::new(
        Some(template.to_string()),
        Some(chars.to_string()),
        true,
        false,
    )
}

/// Creates default test style options
pub fn create_test_style_options() -> StyleOptions {
    StyleOptions::new(create_test_progress_opts(), ProgressBarOpts::with_pip_style())
}

/// Asserts that progress bar options are disabled
pub fn assert_progress_opts_disabled(opts: &ProgressBarOpts) {
    let pb = opts.to_progress_bar(100);
    assert!(pb.is_hidden(), "Progress bar should be disabled");
}
