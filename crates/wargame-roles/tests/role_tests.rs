//! Flows that cross role pages over one shared store

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use wargame_roles::{
    ActionDraft, CaptureDraft, Facilitator, FieldType, InputError, Mode, Notetaker, PageOptions,
    PushOutcome, ResponseDraft, RoleError, RolePage, Schema, UndoEntry, UndoStack, WargameConfig,
    WhiteCell, Workspace, MSG_VALIDATION_FAILED,
};
use wargame_store::keys::Record;
use wargame_store::{MemoryBackend, Move, Phase, SessionKeyStore, SharedStorage};
use wargame_test_utils::{fixture, Fixture};
use wargame_timeline::{ItemType, Team};

fn config() -> WargameConfig {
    WargameConfig::default()
}

fn complete_action(goal: &str) -> ActionDraft {
    ActionDraft {
        mechanism: "export controls".into(),
        sector: "semiconductors".into(),
        targets: vec!["PRC".into()],
        exposure: "medium".into(),
        goal: goal.into(),
        outcomes: "slower fabs".into(),
        contingencies: "allied carve-outs".into(),
    }
}

fn roles(fx: &Fixture) -> (Facilitator, Notetaker, WhiteCell) {
    let cfg = config();
    (
        Facilitator::new(Arc::clone(&fx.store), fx.session.clone(), Move::FIRST, &cfg),
        Notetaker::new(Arc::clone(&fx.store), fx.session.clone(), Move::FIRST, &cfg),
        WhiteCell::new(Arc::clone(&fx.store), fx.session.clone(), Move::FIRST, &cfg),
    )
}

#[tokio::test]
async fn facilitator_submission_reaches_white_cell_blue_lane() {
    let fx = fixture("ex-1");
    let (mut facilitator, _, white) = roles(&fx);
    facilitator.set_phase(Phase::Finalization);
    facilitator.add_action(complete_action("deny access")).unwrap();
    facilitator.submit().await.unwrap();

    let lanes = white.team_timelines();
    assert!(lanes
        .blue
        .iter()
        .any(|item| item.title.as_deref() == Some("Facilitator submitted 1 actions")));
    assert!(lanes.white.is_empty());

    let submitted = white.submitted_actions();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].goal, "deny access");
}

#[tokio::test]
async fn notetaker_submission_shows_as_marker_for_white_cell() {
    let fx = fixture("ex-1");
    let (_, mut notetaker, white) = roles(&fx);
    notetaker.add_capture(CaptureDraft::note("RED is stalling")).unwrap();
    notetaker.submit().await.unwrap();

    let blue = white.team_timelines().blue;
    assert!(blue
        .iter()
        .any(|item| item.item_type == ItemType::Submission && item.team == Some(Team::Blue)));
    assert!(blue
        .iter()
        .any(|item| item.content.as_deref().is_some_and(|c| c.contains("RED is stalling"))));
}

#[tokio::test]
async fn white_cell_response_is_visible_to_facilitator() {
    let fx = fixture("ex-1");
    let (mut facilitator, _, mut white) = roles(&fx);
    assert_eq!(facilitator.poll_white_responses(), 0);

    white
        .send_response(ResponseDraft {
            kind: "clarification".into(),
            title: "Request answered".into(),
            content: "Reserves are low".into(),
        })
        .await
        .unwrap();

    let responses = facilitator.white_responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].summary, "Request answered");
    assert_eq!(responses[0].notes, "Reserves are low");
    assert_eq!(facilitator.poll_white_responses(), 1);
}

#[test]
fn mistyped_record_loads_leniently_and_is_refused_strictly() {
    let fx = fixture("ex-1");
    fx.seed(
        Record::Notes,
        Move::FIRST,
        &json!({"timelineItems": "not a list", "phase": 2, "leader": "Ana"}),
    );
    let (_, mut notetaker, _) = roles(&fx);

    assert!(notetaker.load(Mode::Lenient).unwrap());
    assert!(notetaker.captures().is_empty());
    assert_eq!(notetaker.phase(), Phase::AllianceConsultation);
    assert_eq!(notetaker.field("leader"), Some(&json!("Ana")));
    assert!(fx
        .notifier
        .messages()
        .contains(&MSG_VALIDATION_FAILED.to_string()));

    let err = notetaker.load(Mode::Strict).unwrap_err();
    assert!(matches!(err, RoleError::Schema(_)));
}

#[test]
fn incomplete_action_is_rejected_without_a_write() {
    let fx = fixture("ex-1");
    let (mut facilitator, _, _) = roles(&fx);
    let mut draft = complete_action("x");
    draft.targets.clear();
    let err = facilitator.add_action(draft).unwrap_err();
    assert!(matches!(err, RoleError::Input(InputError::EmptySelection("target"))));
    assert!(fx
        .stored(&Record::Actions.key(&fx.session, Move::FIRST))
        .is_none());
}

#[test]
fn move_switch_keeps_each_move_separate() {
    let fx = fixture("ex-1");
    let (mut facilitator, _, _) = roles(&fx);
    facilitator.add_action(complete_action("first")).unwrap();
    facilitator.switch_move(Move::new(2).unwrap(), Mode::Lenient).unwrap();
    assert!(facilitator.actions().is_empty());
    facilitator.add_action(complete_action("second")).unwrap();

    facilitator.switch_move(Move::FIRST, Mode::Lenient).unwrap();
    assert_eq!(facilitator.actions().len(), 1);
    assert_eq!(facilitator.actions()[0].goal, "first");
}

#[tokio::test]
async fn pages_in_two_contexts_follow_the_white_cell() {
    let shared = SharedStorage::new(Arc::new(MemoryBackend::new()));
    let white_ctx = shared.context();
    let blue_ctx = shared.context();
    let events = blue_ctx.subscribe();
    let cfg = config();

    let white_store = Arc::new(SessionKeyStore::new(Arc::new(white_ctx)));
    let mut white_page = RolePage::open(
        Arc::clone(&white_store),
        &cfg,
        PageOptions {
            query: Some("sessionId=ex-9"),
            ..PageOptions::default()
        },
        |store, session| WhiteCell::new(store, session, Move::FIRST, &cfg),
    )
    .unwrap();

    let blue_store = Arc::new(SessionKeyStore::new(Arc::new(blue_ctx)));
    let mut blue_page = RolePage::open(
        Arc::clone(&blue_store),
        &cfg,
        PageOptions {
            query: Some("sessionId=ex-9"),
            events: Some(events),
            ..PageOptions::default()
        },
        |store, session| Facilitator::new(store, session, Move::FIRST, &cfg),
    )
    .unwrap();

    white_page.workspace().change_phase(Phase::Adjudication).unwrap();
    blue_page.poll_game_state();
    assert_eq!(blue_page.workspace().phase(), Phase::Adjudication);

    blue_page.close().unwrap();
    white_page.close().unwrap();
}

fn any_json() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-z]{0,8}".prop_map(Value::String),
        Just(json!([])),
        Just(json!({})),
    ]
}

proptest! {
    #[test]
    fn lenient_schema_never_keeps_a_mistyped_field(
        items in any_json(),
        phase in any_json(),
        notes in any_json(),
    ) {
        let schema = Schema::new()
            .field_or("timelineItems", FieldType::Array, json!([]))
            .field_or("phase", FieldType::Number, json!(1))
            .field("notes", FieldType::String);
        let record = json!({"timelineItems": items, "phase": phase, "notes": notes});
        let validated = schema.validate(&record, Mode::Lenient).unwrap();

        prop_assert!(validated.record["timelineItems"].is_array());
        prop_assert!(validated.record["phase"].is_number());
        prop_assert!(validated.record.get("notes").map_or(true, Value::is_string));
    }

    #[test]
    fn undo_history_is_bounded(limit in 1usize..20, pushes in 0usize..60) {
        let mut stack = UndoStack::new(limit);
        let mut limit_notices = 0;
        for n in 0..pushes {
            if stack.push(UndoEntry::Edited { original: n }) == PushOutcome::LimitReached {
                limit_notices += 1;
            }
        }
        prop_assert_eq!(stack.len(), pushes.min(limit));
        prop_assert_eq!(limit_notices, usize::from(pushes > limit));
        if pushes > 0 {
            prop_assert_eq!(stack.pop(), Some(UndoEntry::Edited { original: pushes - 1 }));
        }
    }
}
