//! JSON-file backend
//!
//! The whole store is one JSON object of string values, rewritten on every
//! mutation through a temporary file and rename.

use crate::backend::{check_quota, StorageBackend};
use crate::error::BackendError;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write-through file backend
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    entries: Mutex<IndexMap<String, String>>,
    quota: Option<usize>,
}

impl FileBackend {
    /// Open (or lazily create) a store file
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => IndexMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| BackendError::MalformedSnapshot {
                path: path.clone(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexMap::new(),
            Err(e) => return Err(BackendError::io_error(path, e)),
        };
        debug!(path = %path.display(), entries = entries.len(), "opened file store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
            quota: None,
        })
    }

    /// Enforce a byte quota on subsequent writes
    #[inline]
    #[must_use]
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &IndexMap<String, String>) -> Result<(), BackendError> {
        let text = serde_json::to_string_pretty(entries).map_err(|e| BackendError::MalformedSnapshot {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| BackendError::io_error(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(|e| BackendError::io_error(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| BackendError::io_error(&self.path, e))
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let mut entries = self.entries.lock();
        check_quota(&entries, self.quota, key, value)?;
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries) {
            match previous {
                Some(old) => {
                    entries.insert(key.to_string(), old);
                }
                None => {
                    entries.shift_remove(key);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        let mut entries = self.entries.lock();
        let Some(index) = entries.get_index_of(key) else {
            return Ok(());
        };
        let Some((k, old)) = entries.shift_remove_index(index) else {
            return Ok(());
        };
        if let Err(e) = self.persist(&entries) {
            entries.shift_insert(index, k, old);
            return Err(e);
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}
