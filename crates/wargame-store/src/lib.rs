//! Wargame Session Store
//!
//! Session-scoped persistence shared by every role page of a tabletop
//! wargame.
//!
//! # Core Concepts
//!
//! - [`StorageBackend`]: raw string key-value storage ([`MemoryBackend`],
//!   [`FileBackend`], and [`SharedStorage`] contexts with change events)
//! - [`SessionKeyStore`]: JSON reads with repair/quarantine, writes with
//!   quota eviction of other sessions' data
//! - [`SessionResolver`]: picks the active [`SessionId`] for a page load
//! - [`keys`]: the key layout every role agrees on
//! - [`LegacyMigrator`]: one-time copy of unscoped legacy keys
//! - [`create_backup`] / [`restore_backup`]: verbatim session snapshots
//!
//! # Example
//!
//! ```rust,ignore
//! use wargame_store::{MemoryBackend, SessionKeyStore, SessionResolver, LegacyMigrator};
//! use std::sync::Arc;
//!
//! let store = SessionKeyStore::new(Arc::new(MemoryBackend::new()));
//! let session = SessionResolver::new(&store).resolve(Some("?sessionId=ex-1"));
//! LegacyMigrator::new(&store).migrate_once(&session);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod backend;
mod backup;
mod clock;
mod error;
mod export;
mod file;
mod migration;
mod notify;
mod repair;
mod session;
mod shared;
mod store;
mod types;

pub mod keys;

// Re-exports
pub use backend::{MemoryBackend, StorageBackend};
pub use backup::{create_backup, restore_backup, Backup, BACKUP_VERSION};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BackendError, StoreError, StoreResult, ValueError};
pub use export::{export_filename, DirectorySink, ExportSink, MemorySink};
pub use file::FileBackend;
pub use migration::{
    BackupLocation, LegacyMigrator, MigrationCopy, MigrationMarker, MigrationPlan, MigrationReport,
    MSG_BACKUP_CREATED, MSG_BACKUP_FAILED, MSG_MARKER_FAILED, MSG_MIGRATION_DONE,
};
pub use notify::{Level, Notification, Notifier, RecordingNotifier, TracingNotifier};
pub use repair::{decode, Decoded, RepairTransform};
pub use session::{SessionId, SessionResolver, DEFAULT_SESSION, SESSION_PARAM};
pub use shared::{ContextId, SharedStorage, StorageContext, StorageEvent, StorageEvents};
pub use store::{
    SessionKeyStore, DEFAULT_MAX_EVICTIONS, MSG_SPACE_FREED, MSG_STORAGE_FULL,
    MSG_STORAGE_FULL_AFTER_EVICTION,
};
pub use types::{Move, Phase};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
