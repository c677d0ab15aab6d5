//! Durable key-value persistence for item and chunk records.
//!
//! The engine persists every item and chunk mutation through a [`Store`]
//! before the mutation becomes visible to readers, so a crash never loses an
//! acknowledged state change. Records are encoded as JSON.
//!
//! Two implementations are provided:
//!
//! - [`MemoryStore`] - volatile; clones share the same records, which lets
//!   tests simulate a process restart by building a second manager on it
//! - [`FileStore`] - one file per record, written atomically
//!
//! # Examples
//!
//! ```rust
//! use dtg::store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! store.put("item/a", b"{}").unwrap();
//! assert_eq!(store.keys("item/").unwrap(), vec!["item/a".to_string()]);
//! ```

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::utils::paths::encode_segment;

use serde::{de::DeserializeOwned, Serialize};

/// Synchronous, durable key-value storage.
///
/// A successful `put` or `delete` must be durable when it returns.
pub trait Store: Send + Sync {
    /// Write the record stored under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Read the record stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete the record stored under `key`. Deleting a missing key succeeds.
    fn delete(&self, key: &str) -> Result<()>;

    /// List every key starting with `prefix`, in lexicographic order.
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Prefix of item record keys.
pub(crate) const ITEM_PREFIX: &str = "item/";
/// Prefix of chunk record keys.
pub(crate) const CHUNK_PREFIX: &str = "chunk/";

pub(crate) fn item_key(id: &str) -> String {
    format!("{}{}", ITEM_PREFIX, encode_segment(id))
}

pub(crate) fn chunk_prefix(id: &str) -> String {
    format!("{}{}/", CHUNK_PREFIX, encode_segment(id))
}

pub(crate) fn chunk_key(id: &str, index: u32) -> String {
    format!("{}{:08}", chunk_prefix(id), index)
}

pub(crate) fn put_record<T: Serialize>(store: &dyn Store, key: &str, record: &T) -> Result<()> {
    let bytes = serde_json::to_vec(record)?;
    store.put(key, &bytes)
}

pub(crate) fn get_record<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}
