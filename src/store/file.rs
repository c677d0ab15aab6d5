//! File-backed [`Store`] implementation.
//!
//! Every record lives in its own file inside the store directory. The file
//! name is the form-urlencoded key followed by `.json`. Writes go to a
//! temporary file which is synced and then renamed over the record, so a
//! crash leaves either the old or the new record, never a torn one.

use super::Store;
use crate::error::{Error, Result};
use crate::utils::paths::{decode_segment, encode_segment};

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const RECORD_EXTENSION: &str = ".json";
const TEMP_EXTENSION: &str = ".tmp";

/// A durable [`Store`] keeping one file per record.
#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `directory`.
    ///
    /// The directory is created on the first write.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Gets the directory holding the records.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.directory
            .join(format!("{}{}", encode_segment(key), RECORD_EXTENSION))
    }
}

fn storage_error(action: &str, key: &str, e: io::Error) -> Error {
    Error::StorageFailure(format!("cannot {} record {}: {}", action, key, e))
}

impl Store for FileStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.directory).map_err(|e| storage_error("write", key, e))?;

        let path = self.record_path(key);
        let temp = path.with_extension(&TEMP_EXTENSION[1..]);
        let write = || -> io::Result<()> {
            let mut file = File::create(&temp)?;
            file.write_all(value)?;
            file.sync_all()?;
            fs::rename(&temp, &path)
        };
        write().map_err(|e| storage_error("write", key, e))?;

        debug!("Stored record {}", key);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.record_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("read", key, e)),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("delete", key, e)),
        }
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error("list", prefix, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| storage_error("list", prefix, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(encoded) = name.strip_suffix(RECORD_EXTENSION) else {
                continue;
            };
            let key = decode_segment(encoded);
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
