//! Session Key Store
//!
//! JSON view over a [`StorageBackend`] that never fails past its boundary:
//! - reads repair or quarantine corrupt entries and fall back to a default
//! - writes that hit the quota evict other sessions' data and retry once
//!
//! The store is bound to the active [`SessionId`]; eviction never touches
//! the bound session's keys.

use crate::backend::StorageBackend;
use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};
use crate::keys;
use crate::notify::{Notifier, TracingNotifier};
use crate::repair::{self, Decoded};
use crate::session::SessionId;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default cap on entries removed per quota recovery
pub const DEFAULT_MAX_EVICTIONS: usize = 10;

/// Shown when eviction made room
pub const MSG_SPACE_FREED: &str = "Freed storage space by removing old session data";
/// Shown when nothing could be evicted
pub const MSG_STORAGE_FULL: &str =
    "Browser storage is full. Please export your data and clear old sessions.";
/// Shown when eviction did not make enough room
pub const MSG_STORAGE_FULL_AFTER_EVICTION: &str = "Browser storage is full. Tried to free space but still insufficient. Please export your data and clear old sessions.";

/// JSON key-value store scoped to a session
pub struct SessionKeyStore {
    backend: Arc<dyn StorageBackend>,
    session: RwLock<SessionId>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    max_evictions: usize,
}

impl SessionKeyStore {
    /// Store over a backend, bound to the default session
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            session: RwLock::new(SessionId::default()),
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
            max_evictions: DEFAULT_MAX_EVICTIONS,
        }
    }

    /// With notifier
    #[inline]
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// With clock
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// With eviction cap
    #[inline]
    #[must_use]
    pub fn with_max_evictions(mut self, max: usize) -> Self {
        self.max_evictions = max;
        self
    }

    /// With bound session
    #[inline]
    #[must_use]
    pub fn with_session(self, session: SessionId) -> Self {
        *self.session.write() = session;
        self
    }

    /// Currently bound session
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session.read().clone()
    }

    /// Rebind to another session
    pub fn bind_session(&self, session: SessionId) {
        *self.session.write() = session;
    }

    /// Underlying backend
    #[inline]
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Notification sink
    #[inline]
    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Time source
    #[inline]
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Raw stored text
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.backend.get(key)
    }

    /// Whether a key is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.backend.contains(key)
    }

    /// Every key in insertion order
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.backend.keys()
    }

    /// Decoded JSON value
    ///
    /// Repaired text is written back; unrecoverable entries are removed.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        let raw = self.backend.get(key)?;
        if raw.is_empty() {
            return None;
        }
        match repair::decode(&raw) {
            Decoded::Clean(value) => Some(value),
            Decoded::Repaired {
                value,
                canonical,
                applied,
            } => {
                let names: Vec<_> = applied.iter().map(|t| t.name()).collect();
                warn!(key, transforms = ?names, "repaired corrupt entry");
                if let Err(e) = self.backend.set(key, &canonical) {
                    warn!(key, error = %e, "could not write back repaired entry");
                }
                Some(value)
            }
            Decoded::Corrupt { reason } => {
                error!(key, %reason, "quarantining unrecoverable entry");
                if let Err(e) = self.backend.remove(key) {
                    warn!(key, error = %e, "could not remove corrupt entry");
                }
                None
            }
        }
    }

    /// Typed read, `None` when absent, corrupt, or of another shape
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                debug!(key, error = %e, "stored value has unexpected shape");
                None
            }
        }
    }

    /// Typed read with fallback
    pub fn get<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        self.get_opt(key).unwrap_or(fallback)
    }

    /// Typed read with `Default` fallback
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.get_opt(key).unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// JSON-encode and write, recovering from quota once
    pub fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let text = serde_json::to_string(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.write(key, &text)
    }

    /// Write verbatim text, recovering from quota once
    pub fn try_set_raw(&self, key: &str, text: &str) -> StoreResult<()> {
        self.write(key, text)
    }

    /// JSON write reporting success; failures are logged and notified
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        self.report(key, self.try_set(key, value))
    }

    /// Verbatim write reporting success
    pub fn set_raw(&self, key: &str, text: &str) -> bool {
        self.report(key, self.try_set_raw(key, text))
    }

    /// Delete a key
    pub fn remove(&self, key: &str) -> bool {
        match self.backend.remove(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "remove failed");
                false
            }
        }
    }

    /// Remove up to the eviction cap of other sessions' keys
    pub fn evict_other_sessions(&self) -> usize {
        let current = self.session();
        let victims: Vec<String> = self
            .backend
            .keys()
            .into_iter()
            .filter(|key| keys::is_session_scoped(key) && !keys::belongs_to(key, &current))
            .take(self.max_evictions)
            .collect();
        let mut removed = 0;
        for key in &victims {
            match self.backend.remove(key) {
                Ok(()) => removed += 1,
                Err(e) => warn!(key, error = %e, "eviction failed"),
            }
        }
        if removed > 0 {
            info!(session = %current, removed, "evicted other sessions' data");
        }
        removed
    }

    fn write(&self, key: &str, text: &str) -> StoreResult<()> {
        match self.backend.set(key, text) {
            Ok(()) => Ok(()),
            Err(e) if e.is_quota() => {
                warn!(key, error = %e, "storage quota exceeded");
                let evicted = self.evict_other_sessions();
                if evicted == 0 {
                    return Err(StoreError::QuotaExceeded {
                        key: key.to_string(),
                        evicted,
                    });
                }
                match self.backend.set(key, text) {
                    Ok(()) => {
                        self.notifier.info(MSG_SPACE_FREED);
                        Ok(())
                    }
                    Err(retry) if retry.is_quota() => Err(StoreError::QuotaExceeded {
                        key: key.to_string(),
                        evicted,
                    }),
                    Err(retry) => Err(retry.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn report(&self, key: &str, result: StoreResult<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(StoreError::QuotaExceeded { evicted, .. }) => {
                error!(key, evicted, "write abandoned: storage full");
                self.notifier.warning(if evicted > 0 {
                    MSG_STORAGE_FULL_AFTER_EVICTION
                } else {
                    MSG_STORAGE_FULL
                });
                false
            }
            Err(e) => {
                error!(key, error = %e, "write failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for SessionKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyStore")
            .field("session", &*self.session.read())
            .field("max_evictions", &self.max_evictions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::notify::RecordingNotifier;
    use serde_json::json;

    #[test]
    fn absent_and_wrong_shape_fall_back() {
        let store = SessionKeyStore::new(Arc::new(MemoryBackend::new()));
        assert_eq!(store.get::<Vec<u32>>("missing", vec![7]), vec![7]);
        store.set("k", &json!({"a": 1}));
        assert_eq!(store.get::<Vec<u32>>("k", vec![]), Vec::<u32>::new());
        // Shape mismatch does not delete
        assert!(store.contains("k"));
    }

    #[test]
    fn repaired_entry_is_written_back() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set("k", "[1,2,3,]").unwrap();
        let store = SessionKeyStore::new(backend.clone());
        assert_eq!(store.get::<Vec<u32>>("k", vec![]), vec![1, 2, 3]);
        assert_eq!(backend.get("k").as_deref(), Some("[1,2,3]"));
    }

    #[test]
    fn corrupt_entry_is_quarantined() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set("k", "{{{").unwrap();
        let store = SessionKeyStore::new(backend.clone());
        assert_eq!(store.get("k", json!({})), json!({}));
        assert!(backend.get("k").is_none());
    }

    #[test]
    fn empty_text_reads_as_absent() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set("k", "").unwrap();
        let store = SessionKeyStore::new(backend);
        assert_eq!(store.get("k", 5), 5);
    }

    #[test]
    fn quota_evicts_only_foreign_sessions() {
        let backend = Arc::new(MemoryBackend::with_quota(200));
        let notifier = Arc::new(RecordingNotifier::new());
        let store = SessionKeyStore::new(backend.clone())
            .with_notifier(notifier.clone())
            .with_session(SessionId::new("mine"));

        backend.set("notes_session_mine_move_1", "[1]").unwrap();
        backend.set("notes_session_old_move_1", &"x".repeat(60)).unwrap();
        backend.set("currentSessionId", "mine").unwrap();

        assert!(store.set("notes_session_mine_move_2", &"y".repeat(80)));
        assert!(backend.get("notes_session_old_move_1").is_none());
        assert!(backend.get("notes_session_mine_move_1").is_some());
        assert!(backend.get("currentSessionId").is_some());
        assert_eq!(notifier.messages(), vec![MSG_SPACE_FREED.to_string()]);
    }

    #[test]
    fn quota_treats_underscored_session_as_foreign() {
        let backend = Arc::new(MemoryBackend::with_quota(200));
        let store = SessionKeyStore::new(backend.clone()).with_session(SessionId::new("a"));

        backend.set("notes_session_a_move_1", "[1]").unwrap();
        backend.set("notes_session_a_b_move_1", &"x".repeat(60)).unwrap();

        assert!(store.set("notes_session_a_move_2", &"y".repeat(80)));
        assert!(backend.get("notes_session_a_b_move_1").is_none());
        assert!(backend.get("notes_session_a_move_1").is_some());
    }

    #[test]
    fn quota_with_nothing_to_evict_leaves_old_value() {
        let backend = Arc::new(MemoryBackend::with_quota(40));
        let notifier = Arc::new(RecordingNotifier::new());
        let store = SessionKeyStore::new(backend.clone())
            .with_notifier(notifier.clone())
            .with_session(SessionId::new("mine"));
        assert!(store.set("k", &"small"));
        assert!(!store.set("k", &"z".repeat(100)));
        assert_eq!(store.get::<String>("k", String::new()), "small");
        assert_eq!(notifier.messages(), vec![MSG_STORAGE_FULL.to_string()]);
    }
}
