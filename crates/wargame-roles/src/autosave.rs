//! Throttled auto-save export
//!
//! Every save of a workspace may also write a copy of the record to the
//! export sink, at most once per interval per role, session and move. The
//! last export time is kept in the store under `lastAutoSave_<role>_S_M`.

use crate::error::RoleResult;
use crate::role::Role;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use wargame_store::{keys, ExportSink, Move, SessionId, SessionKeyStore};

/// Auto-save policy for one role
#[derive(Clone)]
pub struct AutoSave {
    role: Role,
    interval: Duration,
    sink: Option<Arc<dyn ExportSink>>,
}

impl AutoSave {
    /// Policy without a sink; nothing is exported until one is attached
    #[must_use]
    pub fn new(role: Role, interval: Duration) -> Self {
        Self {
            role,
            interval,
            sink: None,
        }
    }

    /// With export destination
    #[inline]
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ExportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attached sink
    #[must_use]
    pub fn sink(&self) -> Option<&Arc<dyn ExportSink>> {
        self.sink.as_ref()
    }

    /// Filename of the rolling auto-save
    #[must_use]
    pub fn filename(&self, session: &SessionId, mv: Move) -> String {
        format!("autosave_{}_session_{session}_move_{mv}.json", self.role)
    }

    /// Whether the throttle interval has passed
    #[must_use]
    pub fn due(&self, store: &SessionKeyStore, session: &SessionId, mv: Move) -> bool {
        let last = store
            .get_raw(&keys::last_auto_save(self.role.as_str(), session, mv))
            .and_then(|raw| raw.trim().parse::<i64>().ok());
        match last {
            None => true,
            Some(last) => {
                let interval = i64::try_from(self.interval.as_millis()).unwrap_or(i64::MAX);
                store.clock().now_ms().saturating_sub(last) > interval
            }
        }
    }

    /// Export `record` if a sink is attached and the interval has passed
    ///
    /// Returns whether a file was written. Failures are logged only.
    pub fn maybe_export(&self, store: &SessionKeyStore, session: &SessionId, mv: Move, record: &Value) -> bool {
        if self.sink.is_none() || !self.due(store, session, mv) {
            return false;
        }
        match self.export_now(store, session, mv, record) {
            Ok(()) => true,
            Err(e) => {
                warn!(role = %self.role, error = %e, "auto-save export failed");
                false
            }
        }
    }

    /// Export `record` regardless of the throttle and stamp the marker
    pub fn export_now(&self, store: &SessionKeyStore, session: &SessionId, mv: Move, record: &Value) -> RoleResult<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(record)?;
        sink.write(&self.filename(session, mv), &text)?;
        let now = store.clock().now_ms();
        store.set_raw(&keys::last_auto_save(self.role.as_str(), session, mv), &now.to_string());
        debug!(role = %self.role, %session, move_number = %mv, "auto-saved workspace");
        Ok(())
    }
}

impl std::fmt::Debug for AutoSave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSave")
            .field("role", &self.role)
            .field("interval", &self.interval)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
