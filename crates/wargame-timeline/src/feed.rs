//! Per-move feed assembly from namespaced records
//!
//! Each page publishes timeline items under its own key. A feed gathers the
//! relevant sources for one session and move; callers add their local
//! projections and pass everything to [`crate::aggregate`].

use crate::item::{decode_items, ItemType, Team, TimelineItem};
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use wargame_store::keys::Record;
use wargame_store::{Clock, Move, Phase, SessionId, SessionKeyStore};

/// Field holding items inside role records
pub const TIMELINE_FIELD: &str = "timelineItems";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SubmissionView {
    submitted: bool,
    submitted_at: Option<String>,
    phase: Option<Value>,
    timeline_items: Option<Value>,
}

/// Read-side view of one session and move
pub struct Feed<'a> {
    store: &'a SessionKeyStore,
    session: SessionId,
    mv: Move,
}

impl<'a> Feed<'a> {
    /// Feed for a session and move
    #[inline]
    #[must_use]
    pub fn new(store: &'a SessionKeyStore, session: SessionId, mv: Move) -> Self {
        Self { store, session, mv }
    }

    fn record_items(&self, record: Record) -> Vec<TimelineItem> {
        self.store
            .get_value(&record.key(&self.session, self.mv))
            .and_then(|value| value.get(TIMELINE_FIELD).map(decode_items))
            .unwrap_or_default()
    }

    /// Shared White Cell timeline, optionally limited to one team
    #[must_use]
    pub fn white_cell_items(&self, team: Option<Team>) -> Vec<TimelineItem> {
        let items = self.record_items(Record::WhiteCell);
        match team {
            Some(team) => items.into_iter().filter(|i| i.team == Some(team)).collect(),
            None => items,
        }
    }

    /// Notetaker captures as they are stored
    #[must_use]
    pub fn notes_items(&self) -> Vec<TimelineItem> {
        self.record_items(Record::Notes)
    }

    /// Notetaker captures attributed to BLUE, with missing times filled
    #[must_use]
    pub fn notes_items_as_blue(&self) -> Vec<TimelineItem> {
        let clock = self.store.clock();
        self.notes_items()
            .into_iter()
            .map(|mut item| {
                item.team = Some(Team::Blue);
                if item.time.is_none() {
                    item.time = Some(clock.now().to_rfc3339());
                }
                if item.timestamp.is_none() {
                    item.timestamp = Some(clock.now_ms());
                }
                item
            })
            .collect()
    }

    /// Marker item for a Notetaker submission, if one was made
    #[must_use]
    pub fn notes_submission_item(&self, current_phase: Phase) -> Option<TimelineItem> {
        let view: SubmissionView = self
            .store
            .get_opt(&Record::NotesSubmission.key(&self.session, self.mv))?;
        if !view.submitted {
            return None;
        }
        let submitted_ms = view
            .submitted_at
            .as_deref()
            .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
            .map_or_else(|| self.store.clock().now_ms(), |dt| dt.timestamp_millis());
        let count = view
            .timeline_items
            .as_ref()
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        let phase = view
            .phase
            .as_ref()
            .map_or(current_phase, Phase::normalize);
        Some(
            TimelineItem::new(ItemType::Submission)
                .with_title("Notetaker Submission")
                .with_content(format!("Notetaker submitted notes ({count} timeline items)"))
                .with_team(Team::Blue)
                .with_phase(phase)
                .with_timestamp(submitted_ms)
                .with_time(view.submitted_at.unwrap_or_else(|| self.store.clock().now().to_rfc3339())),
        )
    }

    /// BLUE view used by the White Cell: shared BLUE items, notes and the submission marker
    #[must_use]
    pub fn blue_sources(&self, current_phase: Phase) -> Vec<TimelineItem> {
        let mut items = self.white_cell_items(Some(Team::Blue));
        items.extend(self.notes_items_as_blue());
        items.extend(self.notes_submission_item(current_phase));
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use wargame_store::{ManualClock, MemoryBackend};

    fn setup() -> (SessionKeyStore, SessionId, Move) {
        let store = SessionKeyStore::new(Arc::new(MemoryBackend::new()))
            .with_clock(Arc::new(ManualClock::at(9_000)));
        (store, SessionId::new("s"), Move::FIRST)
    }

    #[test]
    fn white_cell_items_filter_by_team() {
        let (store, s, m) = setup();
        store.set(
            &Record::WhiteCell.key(&s, m),
            &json!({"timelineItems": [
                {"id": 1, "type": "ruling", "team": "white"},
                {"id": 2, "type": "action", "team": "BLUE"},
                "garbage"
            ]}),
        );
        let feed = Feed::new(&store, s, m);
        assert_eq!(feed.white_cell_items(None).len(), 2);
        assert_eq!(feed.white_cell_items(Some(Team::Blue)).len(), 1);
    }

    #[test]
    fn notes_are_attributed_to_blue() {
        let (store, s, m) = setup();
        store.set(
            &Record::Notes.key(&s, m),
            &json!({"timelineItems": [{"id": 5, "type": "quote", "content": "hold"}]}),
        );
        let items = Feed::new(&store, s, m).notes_items_as_blue();
        assert_eq!(items[0].team, Some(Team::Blue));
        assert_eq!(items[0].timestamp, Some(9_000));
    }

    #[test]
    fn submission_marker_only_when_submitted() {
        let (store, s, m) = setup();
        let key = Record::NotesSubmission.key(&s, m);
        let feed = Feed::new(&store, s.clone(), m);
        assert!(feed.notes_submission_item(Phase::Finalization).is_none());

        store.set(
            &key,
            &json!({"submitted": true, "submittedAt": "1970-01-01T00:00:02Z", "timelineItems": [1, 2]}),
        );
        let marker = feed.notes_submission_item(Phase::Finalization).unwrap();
        assert_eq!(marker.timestamp, Some(2_000));
        assert_eq!(marker.phase, Some(Phase::Finalization));
        assert_eq!(
            marker.content.as_deref(),
            Some("Notetaker submitted notes (2 timeline items)")
        );
    }
}
