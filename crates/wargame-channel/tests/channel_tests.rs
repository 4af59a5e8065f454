//! Cross-context channel behaviour

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use wargame_channel::{
    game_state_reader, game_state_writer, publish_game_state, TimerController, TimerDisplay,
    TimerPolicy,
};
use wargame_store::{ManualClock, MemoryBackend, Move, Phase, SessionId, SessionKeyStore, SharedStorage};

#[test]
fn follower_sees_white_cell_phase_change() {
    let shared = SharedStorage::new(Arc::new(MemoryBackend::new()));
    let s = SessionId::new("exercise");
    let white = Arc::new(SessionKeyStore::new(Arc::new(shared.context())).with_session(s.clone()));
    let blue = Arc::new(SessionKeyStore::new(Arc::new(shared.context())).with_session(s.clone()));

    let writer = game_state_writer(Arc::clone(&white), &s);
    let reader = game_state_reader(Arc::clone(&blue), &s);

    publish_game_state(&writer, &white, Move::FIRST, Phase::AllianceConsultation).unwrap();
    assert_eq!(reader.poll().unwrap().phase, Phase::AllianceConsultation);
    assert!(reader.poll().is_none());

    publish_game_state(&writer, &white, Move::FIRST, Phase::Finalization).unwrap();
    assert_eq!(reader.poll().unwrap().phase, Phase::Finalization);
}

#[test]
fn timer_display_in_another_context() {
    let clock = Arc::new(ManualClock::at(1_000_000));
    let shared = SharedStorage::new(Arc::new(MemoryBackend::new()));
    let s = SessionId::new("exercise");
    let white = Arc::new(SessionKeyStore::new(Arc::new(shared.context())).with_clock(clock.clone()));
    let blue = Arc::new(SessionKeyStore::new(Arc::new(shared.context())).with_clock(clock.clone()));

    let controller = TimerController::new(white, &s, TimerPolicy::default());
    controller.reset().unwrap();
    let display = TimerDisplay::new(blue, &s, TimerPolicy::default());
    assert_eq!(display.reading().remaining, 5_400);
    assert!(!display.reading().running);

    clock.advance(Duration::from_secs(30));
    // Paused timers do not move
    assert_eq!(display.reading().remaining, 5_400);
}
