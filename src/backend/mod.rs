//! Transfer backend interface.
//!
//! A [`TransferBackend`] performs the actual network I/O of a chunk. The
//! engine hands it [`TransferRequest`]s and receives [`TransferEvent`]s back
//! through the [`TransferEventSink`] attached at start-up. Backends able to
//! outlive the process (OS-managed background sessions) additionally report
//! which transfers are still live and hand over results that arrived while
//! nobody was listening.
//!
//! Every request carries a [`TransferHandle`] minted by the engine: the chunk
//! identity plus an attempt token. Results are keyed by that handle, which is
//! what lets the engine discard stale or duplicated callbacks.
//!
//! [`HttpTransferBackend`] is the in-process implementation built on the
//! crate's HTTP client stack.

pub mod http;

pub use http::HttpTransferBackend;

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// Identity of one transfer attempt of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferHandle {
    /// Id of the item owning the chunk.
    pub item_id: String,
    /// Sequence index of the chunk.
    pub sequence_index: u32,
    /// Attempt token, incremented each time the chunk is dispatched.
    pub attempt: u32,
}

impl TransferHandle {
    /// Creates a new [`TransferHandle`].
    pub fn new(item_id: &str, sequence_index: u32, attempt: u32) -> Self {
        Self {
            item_id: String::from(item_id),
            sequence_index,
            attempt,
        }
    }
}

impl fmt::Display for TransferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}@{}",
            self.item_id, self.sequence_index, self.attempt
        )
    }
}

/// A chunk transfer handed to the backend.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Handle identifying this attempt.
    pub handle: TransferHandle,
    /// Remote location of the chunk.
    pub url: Url,
    /// Where the chunk must be stored once complete.
    pub destination: PathBuf,
    /// Size announced by the track resolver, if any.
    pub expected_size: Option<u64>,
}

/// A successfully stored chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Number of bytes written to `local_path`.
    pub bytes_written: u64,
    /// Durable location of the chunk file.
    pub local_path: PathBuf,
}

/// Errors reported by a transfer backend for a single attempt.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The request could not be sent or the response could not be read.
    #[error("HTTP error")]
    Http {
        #[from]
        source: reqwest_middleware::Error,
    },

    /// The body stream failed midway.
    #[error("stream error")]
    Stream {
        #[from]
        source: reqwest::Error,
    },

    /// The server answered with an error status.
    #[error("server responded with status {0}")]
    Status(reqwest::StatusCode),

    /// Fewer or more bytes than announced were received.
    #[error("expected {expected} bytes, received {received}")]
    Truncated {
        /// Announced size.
        expected: u64,
        /// Bytes actually received.
        received: u64,
    },

    /// Writing the chunk to disk failed.
    #[error("I/O error")]
    Io {
        #[from]
        source: io::Error,
    },

    /// The transfer was cancelled.
    #[error("transfer cancelled")]
    Cancelled,

    /// The backend refused the request.
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// The result of one transfer attempt.
#[derive(Debug)]
pub struct TransferEvent {
    /// Handle of the attempt.
    pub handle: TransferHandle,
    /// What happened.
    pub outcome: Result<Delivery, TransferError>,
}

impl TransferEvent {
    /// A successful attempt.
    pub fn delivered(handle: TransferHandle, bytes_written: u64, local_path: PathBuf) -> Self {
        Self {
            handle,
            outcome: Ok(Delivery {
                bytes_written,
                local_path,
            }),
        }
    }

    /// A failed attempt.
    pub fn failed(handle: TransferHandle, error: TransferError) -> Self {
        Self {
            handle,
            outcome: Err(error),
        }
    }
}

/// Channel end through which a backend reports results to the engine.
#[derive(Debug, Clone)]
pub struct TransferEventSink {
    sender: mpsc::UnboundedSender<TransferEvent>,
}

impl TransferEventSink {
    pub(crate) fn new(sender: mpsc::UnboundedSender<TransferEvent>) -> Self {
        Self { sender }
    }

    /// Deliver an event to the engine.
    ///
    /// The event is handed back if the engine is no longer listening, so the
    /// backend can keep it for [`TransferBackend::drain_background_events`].
    pub fn deliver(&self, event: TransferEvent) -> Result<(), TransferEvent> {
        self.sender.send(event).map_err(|e| e.0)
    }

    /// Returns `true` if the engine stopped listening.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Performs chunk transfers on behalf of the engine.
///
/// `enqueue` and `cancel` must not block and must never report a result
/// synchronously: results always go through the attached sink.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Identifier of the backend's session, matched against the identifier
    /// given to `handle_events_for_background_session`.
    fn session_id(&self) -> &str;

    /// Attach the sink results must be delivered to. Called on every start.
    fn attach(&self, sink: TransferEventSink);

    /// Start transferring a chunk.
    fn enqueue(&self, request: TransferRequest) -> Result<(), TransferError>;

    /// Best-effort cancellation. A cancelled transfer may still report.
    fn cancel(&self, handle: &TransferHandle);

    /// Handles of the transfers still running or whose result was not
    /// handed over yet.
    async fn live_handles(&self) -> HashSet<TransferHandle>;

    /// Results that could not be delivered because nobody was listening.
    async fn drain_background_events(&self, session_id: &str) -> Vec<TransferEvent>;
}
