//! In-memory [`Store`] implementation.

use super::Store;
use crate::error::Result;

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A volatile [`Store`] keeping records in a shared ordered map.
///
/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if the store holds no record.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Store for MemoryStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.records.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.records.lock().remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .records
            .lock()
            .range(prefix.to_string()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
