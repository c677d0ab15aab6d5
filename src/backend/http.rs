//! In-process HTTP transfer backend.
//!
//! Each enqueued chunk runs as its own tokio task: the body is streamed into
//! a `.part` file next to the destination, checked against the announced
//! length and renamed into place. Results go to the attached sink; results
//! finishing while no engine listens are kept until drained.

use super::{
    Delivery, TransferBackend, TransferError, TransferEvent, TransferEventSink, TransferHandle,
    TransferRequest,
};
use crate::http::{create_http_client, HttpClientConfig};
use crate::utils::content_length::extract_content_length;
use crate::utils::paths::partial_path;

use async_trait::async_trait;
use futures::stream::StreamExt;
use parking_lot::Mutex;
use reqwest_middleware::ClientWithMiddleware;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::{fs, io::AsyncWriteExt, runtime, task::JoinHandle};
use tracing::{debug, warn};

/// Session identifier used when none is given.
pub const DEFAULT_SESSION_ID: &str = "dtg.transfers";

#[derive(Default)]
struct State {
    sink: Option<TransferEventSink>,
    tasks: HashMap<TransferHandle, JoinHandle<()>>,
    deferred: Vec<TransferEvent>,
}

/// Downloads chunks with the crate's HTTP client stack.
pub struct HttpTransferBackend {
    client: ClientWithMiddleware,
    session_id: String,
    state: Arc<Mutex<State>>,
}

impl HttpTransferBackend {
    /// Creates a new [`HttpTransferBackend`] around an existing client.
    pub fn new(client: ClientWithMiddleware, session_id: &str) -> Self {
        Self {
            client,
            session_id: String::from(session_id),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Build the client from `config` and use the default session id.
    pub fn with_config(config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(create_http_client(config)?, DEFAULT_SESSION_ID))
    }

    fn finish(state: &Mutex<State>, event: TransferEvent) {
        let mut state = state.lock();
        state.tasks.remove(&event.handle);
        let undelivered = match state.sink.as_ref() {
            Some(sink) => sink.deliver(event).err(),
            None => Some(event),
        };
        if let Some(event) = undelivered {
            debug!("Deferring the result of {}", event.handle);
            state.deferred.push(event);
        }
    }
}

impl std::fmt::Debug for HttpTransferBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransferBackend")
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[async_trait]
impl TransferBackend for HttpTransferBackend {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn attach(&self, sink: TransferEventSink) {
        self.state.lock().sink = Some(sink);
    }

    fn enqueue(&self, request: TransferRequest) -> Result<(), TransferError> {
        let runtime = runtime::Handle::try_current()
            .map_err(|e| TransferError::Rejected(e.to_string()))?;

        let client = self.client.clone();
        let shared = Arc::clone(&self.state);
        let handle = request.handle.clone();

        // The task cannot report before its JoinHandle is registered: it
        // needs the state lock held here.
        let mut state = self.state.lock();
        let task = runtime.spawn(async move {
            let outcome = fetch(&client, &request).await;
            if let Err(e) = &outcome {
                warn!("Transfer {} failed: {}", request.handle, e);
            }
            Self::finish(
                &shared,
                TransferEvent {
                    handle: request.handle,
                    outcome,
                },
            );
        });
        state.tasks.insert(handle, task);
        Ok(())
    }

    fn cancel(&self, handle: &TransferHandle) {
        if let Some(task) = self.state.lock().tasks.remove(handle) {
            debug!("Cancelling {}", handle);
            task.abort();
        }
    }

    async fn live_handles(&self) -> HashSet<TransferHandle> {
        // A transfer stays live until its result has been handed over.
        let state = self.state.lock();
        state
            .tasks
            .keys()
            .chain(state.deferred.iter().map(|event| &event.handle))
            .cloned()
            .collect()
    }

    async fn drain_background_events(&self, session_id: &str) -> Vec<TransferEvent> {
        if session_id != self.session_id {
            return Vec::new();
        }
        std::mem::take(&mut self.state.lock().deferred)
    }
}

async fn fetch(
    client: &ClientWithMiddleware,
    request: &TransferRequest,
) -> Result<Delivery, TransferError> {
    let partial = partial_path(&request.destination);
    let result = write_chunk(client, request).await;
    if result.is_err() {
        let _ = fs::remove_file(&partial).await;
    }
    result
}

async fn write_chunk(
    client: &ClientWithMiddleware,
    request: &TransferRequest,
) -> Result<Delivery, TransferError> {
    debug!("Fetching {}", request.url);
    let res = client.get(request.url.as_str()).send().await?;

    let status = res.status();
    if !status.is_success() {
        return Err(TransferError::Status(status));
    }
    let expected = extract_content_length(&res, request.expected_size);

    if let Some(dir) = request.destination.parent() {
        fs::create_dir_all(dir).await?;
    }
    let partial = partial_path(&request.destination);
    let mut file = fs::File::create(&partial).await?;

    let mut received = 0;
    let mut stream = res.bytes_stream();
    while let Some(item) = stream.next().await {
        let mut chunk = item?;
        received += chunk.len() as u64;
        file.write_all_buf(&mut chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if let Some(expected) = expected {
        if expected != received {
            return Err(TransferError::Truncated { expected, received });
        }
    }

    fs::rename(&partial, &request.destination).await?;
    Ok(Delivery {
        bytes_written: received,
        local_path: request.destination.clone(),
    })
}
