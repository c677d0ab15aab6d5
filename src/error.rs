//! Error handling for the dtg library.
//!
//! This module provides the crate-wide [`Error`] enum returned by every
//! fallible [`ContentManager`](crate::ContentManager) operation, and the
//! [`Result`] alias used throughout the crate. Transfer-level failures have
//! their own [`TransferError`](crate::backend::TransferError) type; they only
//! reach the caller wrapped in [`Error::TransferFailed`] once a chunk has
//! exhausted its retry budget.

use crate::backend::TransferError;
use crate::item::ItemState;

use std::io;
use thiserror::Error;

/// Errors that can happen when using dtg.
#[derive(Error, Debug)]
pub enum Error {
    /// An id-keyed operation referenced an item the registry does not know.
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// `add_item` was called with an id that is already registered.
    #[error("an item with id {0} already exists")]
    DuplicateId(String),

    /// `add_item` was called with an empty id.
    #[error("invalid item id {0:?}")]
    InvalidId(String),

    /// The requested transition is not allowed from the item's current state.
    ///
    /// No mutation is performed when this error is returned.
    #[error("cannot {action} item {id} in state {state}")]
    InvalidState {
        /// Id of the item.
        id: String,
        /// State the item was in when the operation was attempted.
        state: ItemState,
        /// Name of the rejected operation.
        action: &'static str,
    },

    /// The track resolver could not produce a track and chunk list.
    ///
    /// The item stays in the `new` state.
    #[error("failed to load metadata for item {id}: {reason}")]
    MetadataLoadFailed {
        /// Id of the item.
        id: String,
        /// Resolver error message.
        reason: String,
    },

    /// A chunk exhausted its retry budget and the item was marked failed.
    #[error("chunk {index} of item {id} failed")]
    TransferFailed {
        /// Id of the item.
        id: String,
        /// Sequence index of the failed chunk.
        index: u32,
        /// Error reported by the transfer backend on the last attempt.
        #[source]
        source: TransferError,
    },

    /// Persistence failed. The affected operation did not take effect.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// A mutating operation was attempted before `start()`.
    #[error("the content manager is not started")]
    NotStarted,

    /// Error from the underlying URL parser or the expected URL format.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// I/O Error.
    #[error("I/O error")]
    IOError {
        #[from]
        source: io::Error,
    },

    /// Error from an underlying system.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::StorageFailure(format!("record encoding: {}", e))
    }
}

/// Result type alias for operations that can fail with a dtg error.
pub type Result<T> = std::result::Result<T, Error>;
