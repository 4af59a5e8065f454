//! Raw key-value backends
//!
//! A backend stores opaque strings. It knows nothing about JSON, sessions or
//! recovery; those live in [`crate::SessionKeyStore`]. Writes are atomic per
//! key: a failed `set` leaves the previous value in place.

use crate::error::BackendError;
use indexmap::IndexMap;
use parking_lot::Mutex;

/// Synchronous string key-value storage
pub trait StorageBackend: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Delete a value; absent keys are not an error
    fn remove(&self, key: &str) -> Result<(), BackendError>;

    /// Every key, in insertion order
    fn keys(&self) -> Vec<String>;

    /// Whether a key is present
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// In-memory backend with an optional byte quota
///
/// Usage is counted as the UTF-8 length of every key plus value.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<IndexMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryBackend {
    /// Unbounded backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend refusing writes beyond `bytes`
    #[inline]
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            quota: Some(bytes),
        }
    }

    /// Seed from existing entries (quota not enforced for the seed)
    #[must_use]
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            quota: None,
        }
    }

    /// Bytes currently held
    #[must_use]
    pub fn usage(&self) -> usize {
        usage_of(&self.entries.lock())
    }

    /// Copy of every entry in insertion order
    #[must_use]
    pub fn snapshot(&self) -> IndexMap<String, String> {
        self.entries.lock().clone()
    }
}

pub(crate) fn usage_of(entries: &IndexMap<String, String>) -> usize {
    entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

pub(crate) fn check_quota(
    entries: &IndexMap<String, String>,
    quota: Option<usize>,
    key: &str,
    value: &str,
) -> Result<(), BackendError> {
    let Some(limit) = quota else {
        return Ok(());
    };
    let replaced = entries.get(key).map_or(0, |old| key.len() + old.len());
    let needed = usage_of(entries) - replaced + key.len() + value.len();
    if needed > limit {
        return Err(BackendError::QuotaExceeded { needed, limit });
    }
    Ok(())
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let mut entries = self.entries.lock();
        check_quota(&entries, self.quota, key, value)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.entries.lock().shift_remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_keep_insertion_order() {
        let backend = MemoryBackend::new();
        backend.set("b", "1").unwrap();
        backend.set("a", "2").unwrap();
        backend.set("c", "3").unwrap();
        backend.remove("a").unwrap();
        assert_eq!(backend.keys(), vec!["b", "c"]);
    }

    #[test]
    fn quota_rejects_without_partial_write() {
        let backend = MemoryBackend::with_quota(10);
        backend.set("k", "12345").unwrap();
        let err = backend.set("k", "1234567890").unwrap_err();
        assert!(err.is_quota());
        assert_eq!(backend.get("k").as_deref(), Some("12345"));
    }

    #[test]
    fn replacement_counts_only_the_delta() {
        let backend = MemoryBackend::with_quota(10);
        backend.set("k", "123456789").unwrap();
        backend.set("k", "987654321").unwrap();
        assert_eq!(backend.usage(), 10);
    }
}
