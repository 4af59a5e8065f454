//! Shared game clock: current move and phase
//!
//! Only the White Cell publishes; every other page follows through a
//! read-only view and adopts the announced session.

use crate::channel::{ChannelRecord, ReadOnly, ReadWrite};
use crate::error::ChannelError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use wargame_store::{keys, Move, Phase, SessionId, SessionKeyStore};

/// The shared game-state record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Current move
    #[serde(rename = "move")]
    pub move_number: Move,
    /// Current phase
    pub phase: Phase,
    /// Session the White Cell is running
    pub session_id: SessionId,
    /// Epoch milliseconds of the write
    pub last_update: i64,
}

impl ChannelRecord for GameState {
    fn differs(&self, previous: &Self) -> bool {
        self.move_number != previous.move_number
            || self.phase != previous.phase
            || self.session_id != previous.session_id
    }
}

/// Owning view of the game-state channel for a session
#[must_use]
pub fn game_state_writer(store: Arc<SessionKeyStore>, session: &SessionId) -> ReadWrite<GameState> {
    ReadWrite::open(store, keys::shared_game_state(session))
}

/// Following view of the game-state channel for a session
#[must_use]
pub fn game_state_reader(store: Arc<SessionKeyStore>, session: &SessionId) -> ReadOnly<GameState> {
    ReadOnly::open(store, keys::shared_game_state(session))
}

/// Publish a new move and phase
pub fn publish_game_state(
    channel: &ReadWrite<GameState>,
    store: &SessionKeyStore,
    move_number: Move,
    phase: Phase,
) -> Result<GameState, ChannelError> {
    let state = GameState {
        move_number,
        phase,
        session_id: store.session(),
        last_update: store.clock().now_ms(),
    };
    channel.publish(&state)?;
    info!(move_number = %state.move_number, phase = %state.phase, "published game state");
    Ok(state)
}

/// What a follower must do after observing a new game state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStateChange {
    /// Move changed; page must reload its per-move data
    pub move_changed: bool,
    /// Phase changed
    pub phase_changed: bool,
    /// Session changed; page must persist the new default
    pub session_changed: bool,
}

impl GameStateChange {
    /// Compare what a page currently shows against an observed state
    #[must_use]
    pub fn between(move_number: Move, phase: Phase, session: &SessionId, observed: &GameState) -> Self {
        Self {
            move_changed: observed.move_number != move_number,
            phase_changed: observed.phase != phase,
            session_changed: &observed.session_id != session,
        }
    }

    /// Whether anything changed
    #[must_use]
    pub fn any(&self) -> bool {
        self.move_changed || self.phase_changed || self.session_changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wargame_store::{ManualClock, MemoryBackend};

    #[test]
    fn wire_format() {
        let state = GameState {
            move_number: Move::new(2).unwrap(),
            phase: Phase::Adjudication,
            session_id: SessionId::new("s"),
            last_update: 10,
        };
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"move": 2, "phase": 4, "sessionId": "s", "lastUpdate": 10})
        );
    }

    #[test]
    fn publish_then_follow() {
        let store = Arc::new(
            SessionKeyStore::new(Arc::new(MemoryBackend::new()))
                .with_clock(Arc::new(ManualClock::at(77)))
                .with_session(SessionId::new("s")),
        );
        let s = store.session();
        let writer = game_state_writer(Arc::clone(&store), &s);
        let reader = game_state_reader(Arc::clone(&store), &s);

        publish_game_state(&writer, &store, Move::new(3).unwrap(), Phase::ResultsBrief).unwrap();
        let seen = reader.poll().unwrap();
        assert_eq!(seen.last_update, 77);

        let change = GameStateChange::between(Move::FIRST, Phase::ResultsBrief, &s, &seen);
        assert!(change.move_changed);
        assert!(!change.phase_changed);
        assert!(!change.session_changed);

        // Same move/phase with a new timestamp is not a change
        publish_game_state(&writer, &store, Move::new(3).unwrap(), Phase::ResultsBrief).unwrap();
        assert!(reader.poll().is_none());
    }
}
