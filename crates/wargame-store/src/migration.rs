//! Legacy key migration
//!
//! Pages that predate sessions wrote unscoped keys such as
//! `blueRequests_move_1`. Migration copies each into its session-scoped
//! counterpart once per session, guarded by `data_migrated_session_<S>`.
//!
//! The pending copies are planned before anything is written. An empty plan
//! writes nothing at all (no backup, no marker), so running migration any
//! number of times leaves the store exactly as the first run did.

use crate::backup::create_backup;
use crate::export::ExportSink;
use crate::keys::{self, legacy, Record};
use crate::session::SessionId;
use crate::store::SessionKeyStore;
use crate::types::Move;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Shown after an in-store backup
pub const MSG_BACKUP_CREATED: &str = "Data migration backup created";
/// Shown when no backup could be written anywhere
pub const MSG_BACKUP_FAILED: &str = "Warning: Could not create migration backup";
/// Shown after a successful migration
pub const MSG_MIGRATION_DONE: &str = "Data migration completed successfully";
/// Shown when data moved but the marker could not be written
pub const MSG_MARKER_FAILED: &str =
    "Migration completed but failed to save status. Backup available if needed.";

/// One pending legacy copy
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationCopy {
    /// Unscoped source key
    pub legacy: String,
    /// Session-scoped destination key
    pub target: String,
    /// Value written when the source cannot be decoded
    pub fallback: Value,
}

/// Copies a migration run would perform
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    /// Session migrated into
    pub session: SessionId,
    /// Pending copies in execution order
    pub copies: Vec<MigrationCopy>,
}

impl MigrationPlan {
    /// Whether there is nothing to do
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }
}

/// Where the pre-migration backup ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupLocation {
    /// No backup written (nothing to back up, or every attempt failed)
    None,
    /// Stored under this key
    Store(String),
    /// Exported as this file
    File(String),
}

/// Persisted completion marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationMarker {
    /// Completion time
    pub migrated_at: DateTime<Utc>,
    /// Session migrated
    pub session_id: SessionId,
    /// Whether a backup was written first
    pub backup_created: bool,
}

/// Result of a migration run
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    /// Marker was already present
    pub already_migrated: bool,
    /// Target keys written
    pub copied: Vec<String>,
    /// Backup outcome
    pub backup: BackupLocation,
}

impl MigrationReport {
    /// Whether any data moved
    #[inline]
    #[must_use]
    pub fn migrated(&self) -> bool {
        !self.copied.is_empty()
    }
}

/// Runs legacy migration and cleanup against a store
pub struct LegacyMigrator<'a> {
    store: &'a SessionKeyStore,
    sink: Option<&'a dyn ExportSink>,
}

impl<'a> LegacyMigrator<'a> {
    /// Migrator without a file fallback for backups
    #[inline]
    #[must_use]
    pub fn new(store: &'a SessionKeyStore) -> Self {
        Self { store, sink: None }
    }

    /// With export sink used when the backup does not fit in the store
    #[inline]
    #[must_use]
    pub fn with_sink(mut self, sink: &'a dyn ExportSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Pending copies for `session`
    #[must_use]
    pub fn plan(&self, session: &SessionId) -> MigrationPlan {
        let mut planned: HashSet<String> = HashSet::new();
        let mut copies = Vec::new();
        for mv in Move::all() {
            for (legacy_key, record, fallback) in legacy_sources(mv) {
                let target = record.key(session, mv);
                let present = self.store.get_raw(&legacy_key).is_some_and(|raw| !raw.is_empty());
                if present && !self.store.contains(&target) && !planned.contains(&target) {
                    planned.insert(target.clone());
                    copies.push(MigrationCopy {
                        legacy: legacy_key,
                        target,
                        fallback,
                    });
                }
            }
        }
        MigrationPlan {
            session: session.clone(),
            copies,
        }
    }

    /// Migrate once; `true` when any data moved
    pub fn migrate_once(&self, session: &SessionId) -> bool {
        self.run(session).migrated()
    }

    /// Migrate once with a full report
    pub fn run(&self, session: &SessionId) -> MigrationReport {
        let marker_key = keys::migration_marker(session);
        if self.store.contains(&marker_key) {
            return MigrationReport {
                already_migrated: true,
                copied: Vec::new(),
                backup: BackupLocation::None,
            };
        }

        let plan = self.plan(session);
        if plan.is_empty() {
            return MigrationReport {
                already_migrated: false,
                copied: Vec::new(),
                backup: BackupLocation::None,
            };
        }

        let backup = self.back_up(session);
        let mut copied = Vec::new();
        for copy in &plan.copies {
            let value = self
                .store
                .get_value(&copy.legacy)
                .unwrap_or_else(|| copy.fallback.clone());
            if self.store.set(&copy.target, &value) {
                info!(from = %copy.legacy, to = %copy.target, "migrated legacy key");
                copied.push(copy.target.clone());
            }
        }

        if !copied.is_empty() {
            let marker = MigrationMarker {
                migrated_at: self.store.clock().now(),
                session_id: session.clone(),
                backup_created: backup != BackupLocation::None,
            };
            if self.store.set(&marker_key, &marker) {
                info!(session = %session, copied = copied.len(), "data migration completed");
                self.store.notifier().info(MSG_MIGRATION_DONE);
            } else {
                error!(session = %session, "failed to mark migration as complete");
                self.store.notifier().warning(MSG_MARKER_FAILED);
            }
        }

        MigrationReport {
            already_migrated: false,
            copied,
            backup,
        }
    }

    /// Remove every legacy key; returns the number removed
    pub fn cleanup_legacy_keys(&self) -> usize {
        let doomed: Vec<String> = self
            .store
            .keys()
            .into_iter()
            .filter(|key| legacy::is_legacy(key))
            .collect();
        for key in &doomed {
            if self.store.remove(key) {
                info!(key, "removed legacy key");
            }
        }
        doomed.len()
    }

    fn back_up(&self, session: &SessionId) -> BackupLocation {
        let backup = create_backup(self.store, session);
        if backup.is_empty() {
            return BackupLocation::None;
        }

        let key = keys::migration_backup(session, self.store.clock().now_ms());
        let stored = serde_json::to_string(&backup)
            .map_err(|e| e.to_string())
            .and_then(|text| self.store.backend().set(&key, &text).map_err(|e| e.to_string()));
        match stored {
            Ok(()) => {
                info!(key, entries = backup.data.len(), "migration backup created");
                self.store.notifier().info(MSG_BACKUP_CREATED);
                return BackupLocation::Store(key);
            }
            Err(reason) => error!(key, %reason, "failed to store migration backup"),
        }

        let filename = format!(
            "migration_backup_{session}_{}.json",
            self.store.clock().now().format("%Y-%m-%d")
        );
        let exported = match (self.sink, serde_json::to_string_pretty(&backup)) {
            (Some(sink), Ok(text)) => sink.write(&filename, &text).map_err(|e| e.to_string()),
            (None, _) => Err("no export sink configured".to_string()),
            (_, Err(e)) => Err(e.to_string()),
        };
        match exported {
            Ok(()) => {
                info!(filename, "migration backup exported");
                BackupLocation::File(filename)
            }
            Err(reason) => {
                warn!(%reason, "could not export migration backup");
                self.store.notifier().warning(MSG_BACKUP_FAILED);
                BackupLocation::None
            }
        }
    }
}

fn legacy_sources(mv: Move) -> [(String, Record, Value); 8] {
    [
        (legacy::blue_requests(mv), Record::BlueRequests, json!([])),
        (legacy::blue_actions(mv), Record::BlueActions, json!({})),
        (legacy::adjudications(mv), Record::Adjudications, json!([])),
        (legacy::white_cell(mv), Record::WhiteCell, json!({})),
        (legacy::communications(mv), Record::Communications, json!([])),
        (legacy::blue_facilitator(mv), Record::Notes, json!({})),
        (legacy::blue_actions_submitted(mv), Record::BlueActions, json!({})),
        (legacy::blue_requests_submitted(mv), Record::BlueRequests, json!([])),
    ]
}
