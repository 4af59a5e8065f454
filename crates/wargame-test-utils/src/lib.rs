//! Testing utilities for the wargame workspace
//!
//! Shared fixtures: in-memory stores on a frozen clock, recorded
//! notifications, and sample timeline items.

#![allow(missing_docs)]

use serde_json::Value;
use std::sync::Arc;
use wargame_channel::{game_state_writer, publish_game_state, GameState};
use wargame_store::{
    keys::Record, ManualClock, MemoryBackend, Move, Phase, RecordingNotifier, SessionId,
    SessionKeyStore,
};
use wargame_timeline::{ItemId, ItemType, Team, TimelineItem};

/// Epoch milliseconds every fixture clock starts at (2023-11-14T22:13:20Z)
pub const T0: i64 = 1_700_000_000_000;

pub struct Fixture {
    pub backend: Arc<MemoryBackend>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<SessionKeyStore>,
    pub session: SessionId,
}

impl Fixture {
    /// Read a key back as JSON straight from the backend
    pub fn stored(&self, key: &str) -> Option<Value> {
        self.store.get_value(key)
    }

    /// Write a raw record for `record` in the fixture session
    pub fn seed(&self, record: Record, mv: Move, value: &Value) {
        assert!(self.store.set(&record.key(&self.session, mv), value));
    }

    /// Publish a game state the way the White Cell does
    pub fn publish(&self, mv: Move, phase: Phase) -> GameState {
        let channel = game_state_writer(Arc::clone(&self.store), &self.session);
        publish_game_state(&channel, &self.store, mv, phase).unwrap()
    }
}

/// Memory store bound to `session`, with a manual clock and recorded notifications
pub fn fixture(session: &str) -> Fixture {
    fixture_with_backend(Arc::new(MemoryBackend::new()), session)
}

pub fn fixture_with_backend(backend: Arc<MemoryBackend>, session: &str) -> Fixture {
    let notifier = Arc::new(RecordingNotifier::new());
    let clock = Arc::new(ManualClock::at(T0));
    let session = SessionId::new(session);
    let store = SessionKeyStore::new(backend.clone())
        .with_notifier(notifier.clone())
        .with_clock(clock.clone())
        .with_session(session.clone());
    Fixture {
        backend,
        notifier,
        clock,
        store: Arc::new(store),
        session,
    }
}

pub fn note(id: i64, content: &str) -> TimelineItem {
    TimelineItem::new(ItemType::Note)
        .with_id(ItemId::number(id))
        .with_content(content)
        .with_timestamp(T0 + id)
}

pub fn team_item(id: i64, kind: ItemType, team: Team, content: &str) -> TimelineItem {
    TimelineItem::new(kind)
        .with_id(ItemId::number(id))
        .with_title(content)
        .with_content(content)
        .with_team(team)
        .with_phase(Phase::InternalDeliberation)
        .with_timestamp(T0 + id)
}
