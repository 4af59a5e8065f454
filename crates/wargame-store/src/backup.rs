//! Session backup and restore
//!
//! A backup captures the raw text of every key mentioning the session (plus
//! the persisted default session) so that restore is byte-for-byte.

use crate::error::StoreResult;
use crate::keys;
use crate::session::SessionId;
use crate::store::SessionKeyStore;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Backup format version
pub const BACKUP_VERSION: &str = "1.0";

const MIGRATION_BACKUP_PREFIX: &str = "migration_backup_";

/// Snapshot of one session's raw entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    /// Format version
    pub version: String,
    /// Session captured
    pub session_id: SessionId,
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Raw stored text by key
    pub data: IndexMap<String, String>,
}

impl Backup {
    /// Whether nothing was captured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Capture every key containing the session id, and `currentSessionId`
///
/// Earlier migration backups are skipped so backups do not nest.
#[must_use]
pub fn create_backup(store: &SessionKeyStore, session: &SessionId) -> Backup {
    let data = store
        .keys()
        .into_iter()
        .filter(|key| {
            (key.contains(session.as_str()) || key.contains(keys::CURRENT_SESSION_ID))
                && !key.starts_with(MIGRATION_BACKUP_PREFIX)
        })
        .filter_map(|key| store.get_raw(&key).map(|raw| (key, raw)))
        .collect();
    Backup {
        version: BACKUP_VERSION.to_string(),
        session_id: session.clone(),
        timestamp: store.clock().now(),
        data,
    }
}

/// Write every captured entry back verbatim; returns entries written
pub fn restore_backup(store: &SessionKeyStore, backup: &Backup) -> StoreResult<usize> {
    for (key, raw) in &backup.data {
        store.try_set_raw(key, raw)?;
    }
    info!(session = %backup.session_id, entries = backup.data.len(), "restored backup");
    Ok(backup.data.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, StorageBackend};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn round_trip_restores_exact_text() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SessionKeyStore::new(backend.clone());
        let s = SessionId::new("s1");
        backend.set("notes_session_s1_move_1", "{\"phase\":2,}").unwrap();
        backend.set("sharedTimer_session_s1", "{\"seconds\":600}").unwrap();
        backend.set("currentSessionId", "s1").unwrap();
        backend.set("notes_session_s2_move_1", "{}").unwrap();

        let backup = create_backup(&store, &s);
        assert_eq!(backup.data.len(), 3);
        let before = backend.snapshot();

        backend.set("notes_session_s1_move_1", "{}").unwrap();
        backend.remove("sharedTimer_session_s1").unwrap();

        assert_eq!(restore_backup(&store, &backup).unwrap(), 3);
        for (key, raw) in &backup.data {
            assert_eq!(backend.get(key).as_ref(), before.get(key));
            assert_eq!(backend.get(key).as_ref(), Some(raw));
        }
    }

    #[test]
    fn backup_serializes_camel_case() {
        let store = SessionKeyStore::new(Arc::new(MemoryBackend::new()));
        let backup = create_backup(&store, &SessionId::new("x"));
        let value = serde_json::to_value(&backup).unwrap();
        assert_eq!(value["version"], "1.0");
        assert_eq!(value["sessionId"], "x");
        assert!(value["data"].as_object().unwrap().is_empty());
    }
}
