//! Appending to the shared White Cell timeline
//!
//! Every role appends canonical events to `timelineItems` of the White Cell
//! record for the move. The append is a read-modify-write with no locking;
//! concurrent appends from two contexts can lose one of the items.

use crate::error::TimelineError;
use crate::feed::TIMELINE_FIELD;
use crate::item::{ItemId, Team, TimelineItem};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use wargame_store::keys::{self, Record};
use wargame_store::{Move, SessionId, SessionKeyStore, StoreError};

/// Default number of attempts
pub const DEFAULT_ATTEMPTS: u32 = 3;
/// Default backoff unit
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(50);

/// Shown when storage is full during an append
pub const MSG_TIMELINE_STORAGE_FULL: &str = "Storage full. Please export data and clear storage.";
/// Shown when every attempt failed
pub const MSG_TIMELINE_APPEND_FAILED: &str = "Failed to save timeline item. Please try again.";

/// Broadcast marker written after a successful append
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineUpdate {
    /// Move appended to
    pub move_number: Move,
    /// Appended event
    pub item: TimelineItem,
    /// Team of the event
    pub team: Team,
    /// Epoch milliseconds
    pub timestamp: i64,
}

/// Result of a successful append call
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// Event stored
    Appended(TimelineItem),
    /// An event with this id already exists; nothing written
    Duplicate(ItemId),
}

/// Appends canonical events with bounded retries
#[derive(Clone)]
pub struct TimelineWriter {
    store: Arc<SessionKeyStore>,
    attempts: u32,
    backoff: Duration,
}

impl TimelineWriter {
    /// Writer with default retry policy
    #[must_use]
    pub fn new(store: Arc<SessionKeyStore>) -> Self {
        Self {
            store,
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// With attempt count (at least one)
    #[inline]
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// With backoff unit
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Check required fields
    pub fn validate(draft: &TimelineItem) -> Result<(), TimelineError> {
        let blank = |field: &Option<String>| field.as_deref().map_or(true, |s| s.trim().is_empty());
        if draft.phase.is_none() {
            return Err(TimelineError::MissingField("phase"));
        }
        if draft.item_type.as_str().is_empty() {
            return Err(TimelineError::MissingField("type"));
        }
        if blank(&draft.title) {
            return Err(TimelineError::MissingField("title"));
        }
        if blank(&draft.content) {
            return Err(TimelineError::MissingField("content"));
        }
        if draft.team.is_none() {
            return Err(TimelineError::MissingField("team"));
        }
        Ok(())
    }

    /// Canonical event for a validated draft
    #[must_use]
    pub fn prepare(&self, mv: Move, draft: TimelineItem) -> TimelineItem {
        let clock = self.store.clock();
        let now_ms = clock.now_ms();
        TimelineItem {
            id: draft
                .present_id()
                .cloned()
                .or_else(|| Some(ItemId::generate(now_ms))),
            move_number: Some(mv),
            phase: draft.phase,
            time: Some(clock.now().to_rfc3339()),
            timestamp: Some(now_ms),
            item_type: draft.item_type,
            title: draft.title,
            content: draft.content,
            team: draft.team,
            faction: None,
            marker: None,
            refs: Some(draft.refs.unwrap_or_else(|| Value::Object(Map::new()))),
            extra: Map::new(),
        }
    }

    /// Validate, then append with retries
    pub async fn append(
        &self,
        session: &SessionId,
        mv: Move,
        draft: TimelineItem,
    ) -> Result<AppendOutcome, TimelineError> {
        Self::validate(&draft)?;
        let event = self.prepare(mv, draft);
        let key = Record::WhiteCell.key(session, mv);

        let mut failures = 0;
        loop {
            match self.attempt(&key, mv, &event) {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_quota() => {
                    error!(key, "storage quota exceeded while appending timeline item");
                    self.store.notifier().warning(MSG_TIMELINE_STORAGE_FULL);
                    return Err(TimelineError::StorageFull { key });
                }
                Err(e) => {
                    failures += 1;
                    if failures >= self.attempts {
                        error!(key, attempts = failures, error = %e, "timeline append failed");
                        self.store.notifier().error(MSG_TIMELINE_APPEND_FAILED);
                        return Err(TimelineError::exhausted(key, failures, e));
                    }
                    let wait = self.backoff * (failures + 1);
                    debug!(key, attempt = failures, ?wait, error = %e, "retrying timeline append");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn attempt(&self, key: &str, mv: Move, event: &TimelineItem) -> Result<AppendOutcome, StoreError> {
        let mut record = match self.store.get_value(key) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let mut items = record
            .get(TIMELINE_FIELD)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if let Some(id) = event.present_id() {
            let wanted = id.to_string();
            let exists = items.iter().any(|entry| {
                entry
                    .get("id")
                    .and_then(|v| serde_json::from_value::<ItemId>(v.clone()).ok())
                    .is_some_and(|existing| existing.to_string() == wanted)
            });
            if exists {
                warn!(key, id = %wanted, "timeline item with same id already exists, skipping");
                return Ok(AppendOutcome::Duplicate(id.clone()));
            }
        }

        let encoded = serde_json::to_value(event).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        items.push(encoded);
        record.insert(TIMELINE_FIELD.to_string(), Value::Array(items));
        self.store.try_set(key, &Value::Object(record))?;

        if let Some(team) = event.team {
            let update = TimelineUpdate {
                move_number: mv,
                item: event.clone(),
                team,
                timestamp: self.store.clock().now_ms(),
            };
            self.store.set(keys::TIMELINE_UPDATE, &update);
        }
        Ok(AppendOutcome::Appended(event.clone()))
    }
}
