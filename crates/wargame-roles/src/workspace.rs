//! Behavior shared by the role workspaces

use crate::error::RoleResult;
use crate::role::Role;
use crate::schema::Mode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;
use wargame_channel::GameState;
use wargame_store::{Move, Phase, SessionId, SessionKeyStore};
use wargame_timeline::{Feed, Team, TimelineItem};

/// Shown when a loaded record had to be repaired
pub const MSG_VALIDATION_FAILED: &str = "Data validation failed - some data may be missing";

/// Shown after a role export
pub const MSG_EXPORTED: &str = "Data exported successfully";

/// A role's in-memory state for one session and move
pub trait Workspace: Send {
    /// Owning role
    fn role(&self) -> Role;

    /// Session in use
    fn session(&self) -> &SessionId;

    /// Move being edited
    fn move_number(&self) -> Move;

    /// Current phase
    fn phase(&self) -> Phase;

    /// Follow a phase change
    fn set_phase(&mut self, phase: Phase);

    /// Persist the workspace record
    fn save(&mut self) -> RoleResult<()>;

    /// Replace in-memory state with the stored record; `false` when none was stored
    fn load(&mut self, mode: Mode) -> RoleResult<bool>;

    /// The record `save` writes
    fn record(&self) -> Value;

    /// Merged, deduplicated view for this role, newest first
    fn timeline(&self) -> Vec<TimelineItem>;

    /// Point at another session without saving
    fn rebind(&mut self, session: SessionId);

    /// Point at another move and load it
    fn retarget(&mut self, mv: Move);

    /// Pick up changes other pages made outside the shared channels
    ///
    /// Returns how many new entries were seen.
    fn poll_updates(&mut self) -> usize {
        0
    }

    /// Save, then switch to `mv` and load it
    fn switch_move(&mut self, mv: Move, mode: Mode) -> RoleResult<bool> {
        if mv == self.move_number() {
            return Ok(true);
        }
        self.save()?;
        self.retarget(mv);
        self.load(mode)
    }

    /// Follow an observed game state; returns whether the move changed
    fn follow(&mut self, state: &GameState, mode: Mode) -> RoleResult<bool> {
        if state.session_id != *self.session() {
            self.rebind(state.session_id.clone());
            self.retarget(state.move_number);
            self.set_phase(state.phase);
            self.load(mode)?;
            return Ok(true);
        }
        let moved = state.move_number != self.move_number();
        if moved {
            self.retarget(state.move_number);
            self.load(mode)?;
        }
        self.set_phase(state.phase);
        Ok(moved)
    }
}

/// Millisecond ids that stay unique within one workspace
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct IdSource {
    last: i64,
}

impl IdSource {
    pub(crate) fn next(&mut self, now_ms: i64) -> i64 {
        self.last = now_ms.max(self.last.saturating_add(1));
        self.last
    }

    pub(crate) fn observe(&mut self, id: i64) {
        self.last = self.last.max(id);
    }
}

/// Decode each element of an array, skipping the ones that do not fit
pub(crate) fn decode_list<T: DeserializeOwned>(value: Option<&Value>, what: &str) -> Vec<T> {
    split_list(value, what).0
}

/// Decode each element of an array; elements that do not fit are returned
/// verbatim so a later save can write them back
pub(crate) fn split_list<T: DeserializeOwned>(value: Option<&Value>, what: &str) -> (Vec<T>, Vec<Value>) {
    let Some(Value::Array(entries)) = value else {
        return (Vec::new(), Vec::new());
    };
    let mut decoded = Vec::with_capacity(entries.len());
    let mut kept = Vec::new();
    for entry in entries {
        match serde_json::from_value(entry.clone()) {
            Ok(item) => decoded.push(item),
            Err(e) => {
                warn!(what, error = %e, "undecodable entry kept as stored");
                kept.push(entry.clone());
            }
        }
    }
    (decoded, kept)
}

/// Append verbatim entries to the array stored under `field`
pub(crate) fn append_kept(record: &mut Value, field: &str, kept: &[Value]) {
    if kept.is_empty() {
        return;
    }
    if let Some(Value::Array(entries)) = record.get_mut(field) {
        entries.extend(kept.iter().cloned());
    }
}

/// Value of the first key present in the store
pub(crate) fn first_present(store: &SessionKeyStore, keys: &[String]) -> Option<(String, Value)> {
    keys.iter()
        .find_map(|key| store.get_value(key).map(|value| (key.clone(), value)))
}

/// Array stored under the first present key, empty when none
pub(crate) fn read_array(store: &SessionKeyStore, keys: &[String]) -> Vec<Value> {
    match first_present(store, keys) {
        Some((_, Value::Array(entries))) => entries,
        _ => Vec::new(),
    }
}

/// BLUE items of the shared timeline for every move, tagged with their move
pub(crate) fn blue_items_all_moves(store: &SessionKeyStore, session: &SessionId) -> Vec<TimelineItem> {
    Move::all()
        .flat_map(|mv| {
            Feed::new(store, session.clone(), mv)
                .white_cell_items(Some(Team::Blue))
                .into_iter()
                .map(move |mut item| {
                    item.move_number = Some(mv);
                    item
                })
        })
        .collect()
}

/// Flatten `timelineItems` of per-move records into the decision timeline export shape
pub(crate) fn decision_timeline<'a>(moves: impl IntoIterator<Item = (Move, &'a Value)>) -> Vec<Value> {
    moves
        .into_iter()
        .flat_map(|(mv, record)| {
            let items = record
                .get("timelineItems")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            items.into_iter().map(move |item| {
                serde_json::json!({
                    "move": mv.number(),
                    "time": item.get("time").cloned().unwrap_or(Value::Null),
                    "phase": item.get("phase").cloned().unwrap_or(Value::Null),
                    "type": item.get("type").cloned().unwrap_or(Value::Null),
                    "content": item.get("content").cloned().unwrap_or(Value::Null),
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_never_repeat_within_a_millisecond() {
        let mut ids = IdSource::default();
        assert_eq!(ids.next(100), 100);
        assert_eq!(ids.next(100), 101);
        ids.observe(500);
        assert_eq!(ids.next(200), 501);
    }

    #[test]
    fn decode_list_skips_bad_entries() {
        let value = json!([1, "two", 3]);
        let numbers: Vec<i64> = decode_list(Some(&value), "numbers");
        assert_eq!(numbers, vec![1, 3]);
        assert!(decode_list::<i64>(Some(&json!({"a": 1})), "numbers").is_empty());
    }

    #[test]
    fn split_list_returns_misfits_for_write_back() {
        let value = json!([1, "two", 3, null]);
        let (numbers, kept): (Vec<i64>, _) = split_list(Some(&value), "numbers");
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(kept, vec![json!("two"), Value::Null]);

        let mut record = json!({"numbers": [1, 3]});
        append_kept(&mut record, "numbers", &kept);
        assert_eq!(record["numbers"], json!([1, 3, "two", null]));
    }

    #[test]
    fn decision_timeline_flattens_moves() {
        let m1 = json!({"timelineItems": [{"type": "note", "content": "a", "time": "10:00", "phase": 1}]});
        let m2 = json!({"timelineItems": [{"type": "quote", "content": "b"}]});
        let out = decision_timeline([(Move::FIRST, &m1), (Move::LAST, &m2)]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["move"], json!(1));
        assert_eq!(out[1]["type"], json!("quote"));
        assert_eq!(out[1]["time"], Value::Null);
    }
}
