//! White Cell (game control) workspace
//!
//! The White Cell owns the game clock: it publishes the current move and
//! phase and drives the shared countdown. Its per-move record doubles as the
//! shared timeline that every role appends to, so saving merges whatever
//! other pages appended since the last load instead of overwriting it.
//!
//! Rulings, adjudications and communications to BLUE each live under their
//! own session key, with the unscoped legacy key read when the scoped one is
//! absent.

use crate::autosave::AutoSave;
use crate::config::WargameConfig;
use crate::error::{InputError, RoleError, RoleResult};
use crate::facilitator::{mirrored_requests, Action, FacilitatorRecord, InfoRequest};
use crate::role::Role;
use crate::schema::{FieldType, Mode, Schema};
use crate::workspace::{
    append_kept, decision_timeline, decode_list, first_present, read_array, Workspace, MSG_EXPORTED,
    MSG_VALIDATION_FAILED,
};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use wargame_channel::{
    game_state_writer, publish_game_state, GameState, ReadWrite, TimerController, TimerState,
};
use wargame_store::keys::{self, legacy, Record};
use wargame_store::{export_filename, ExportSink, Move, Phase, SessionId, SessionKeyStore};
use wargame_timeline::{
    aggregate, decode_items, partition_by_team, split_items, Feed, Identity, ItemType, Team, TeamTimelines,
    TimelineItem, TimelineUpdate, TimelineWriter, TIMELINE_FIELD,
};

/// Scoped record families cleared by a full reset
const RESET_RECORDS: [Record; 7] = [
    Record::WhiteCell,
    Record::WhiteCellFeedback,
    Record::WhiteCellRulings,
    Record::Communications,
    Record::Adjudications,
    Record::BlueActions,
    Record::BlueRequests,
];

/// GREEN and RED submission prefixes, also cleared by a full reset
const OTHER_TEAM_RESET: [&str; 4] = ["greenActions", "redActions", "greenRequests", "redRequests"];

/// Shown after an adjudication is stored
pub const MSG_ADJUDICATION_SAVED: &str = "Adjudication saved successfully";
/// Shown after a response to BLUE is stored
pub const MSG_RESPONSE_SENT: &str = "Response sent to BLUE Team!";
/// Ruling narratives longer than this are cut in the ruling log
pub const RULING_SUMMARY_CHARS: usize = 200;

const RECORD_FIELDS: [&str; 5] = ["timestamp", "timerRemaining", TIMELINE_FIELD, "currentPhase", "move"];

static LEGACY_RESET: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^(whiteCell|blueMove|greenMove|redMove)",
        r"^blueActionsSubmittedMove\d+$",
        r"^blueRequestsSubmittedMove\d+$",
        r"^greenMove\d+Submitted$",
        r"^redMove\d+Submitted$",
    ]
    .iter()
    .filter_map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build().ok())
    .collect()
});

/// Faction tag of a White Cell capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactionTag {
    /// BLUE team
    Blue,
    /// GREEN team
    Green,
    /// RED team
    Red,
    /// Several teams at once
    CrossTeam,
}

impl FactionTag {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Red => "red",
            Self::CrossTeam => "cross",
        }
    }

    /// Label prefixed to the capture text
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Blue => "BLUE",
            Self::Green => "GREEN",
            Self::Red => "RED",
            Self::CrossTeam => "Cross-Team",
        }
    }
}

/// A stored ruling
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ruling {
    /// What was ruled on
    pub subject: String,
    /// The ruling
    pub ruling: String,
    /// Why
    pub rationale: String,
    /// Display time
    pub time: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    /// Move
    #[serde(rename = "move")]
    pub move_number: u8,
}

/// Form input for a ruling
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulingDraft {
    /// What is ruled on
    pub subject: String,
    /// The ruling
    pub ruling: String,
    /// Why, optional
    pub rationale: String,
}

/// Effect of an action on a relationship
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Interdependency {
    /// Nature of the impact
    pub impact: String,
    /// Severity
    pub severity: String,
}

/// Effect of an action on a structural track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructuralImpact {
    /// Change to BLUE's position
    pub blue_effect: String,
    /// Change to RED's trajectory
    pub red_effect: String,
    /// Net advantage
    pub advantage: String,
}

impl StructuralImpact {
    fn is_blank(&self) -> bool {
        self.blue_effect.is_empty() && self.red_effect.is_empty() && self.advantage.is_empty()
    }
}

/// A stored adjudication of one BLUE action
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Adjudication {
    /// Adjudicated action
    pub action_id: String,
    /// Vulnerabilities exposed
    pub vulnerabilities: Vec<String>,
    /// Relationship impacts by relationship name
    pub interdependencies: BTreeMap<String, Interdependency>,
    /// Structural impacts by track name
    pub structural_impacts: BTreeMap<String, StructuralImpact>,
    /// Outcome label
    pub outcome: String,
    /// Narrative
    pub narrative: String,
    /// RFC 3339 time
    pub timestamp: String,
    /// Move
    #[serde(rename = "move")]
    pub move_number: u8,
    /// Phase at adjudication
    pub phase: Phase,
}

/// Form input for an adjudication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjudicationDraft {
    /// Adjudicated action
    pub action_id: String,
    /// Vulnerabilities exposed
    pub vulnerabilities: Vec<String>,
    /// Relationship impacts
    pub interdependencies: BTreeMap<String, Interdependency>,
    /// Structural impacts
    pub structural_impacts: BTreeMap<String, StructuralImpact>,
    /// Outcome label
    pub outcome: String,
    /// Narrative
    pub narrative: String,
}

impl AdjudicationDraft {
    /// Require an action, an outcome, a narrative and at least one vulnerability
    pub fn validate(&self) -> Result<(), InputError> {
        if self.action_id.trim().is_empty() {
            return Err(InputError::EmptySelection("action"));
        }
        if self.outcome.trim().is_empty() {
            return Err(InputError::MissingField("outcome"));
        }
        if self.narrative.trim().is_empty() {
            return Err(InputError::MissingField("narrative"));
        }
        if self.vulnerabilities.is_empty() {
            return Err(InputError::EmptySelection("vulnerability"));
        }
        Ok(())
    }
}

/// A stored message to BLUE
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Communication {
    /// Message kind
    #[serde(rename = "type")]
    pub kind: String,
    /// Headline
    pub title: String,
    /// Body
    pub content: String,
    /// Move
    #[serde(rename = "move")]
    pub move_number: u8,
    /// RFC 3339 time
    pub timestamp: String,
    /// RFC 3339 time
    pub responded_at: String,
    /// Sender
    pub from: String,
    /// Recipient
    pub to: String,
}

/// Form input for a response to BLUE
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseDraft {
    /// Message kind
    pub kind: String,
    /// Headline
    pub title: String,
    /// Body
    pub content: String,
}

/// Counts reported when a move is finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finalization {
    /// Finalized move
    #[serde(rename = "move")]
    pub move_number: Move,
    /// Timeline items in the record
    pub timeline_count: usize,
    /// Rulings recorded
    pub rulings: usize,
    /// Feedback entries sent
    pub communications: usize,
}

/// White Cell workspace
pub struct WhiteCell {
    store: Arc<SessionKeyStore>,
    writer: TimelineWriter,
    autosave: AutoSave,
    game_state: ReadWrite<GameState>,
    timer: Arc<TimerController>,
    config: WargameConfig,
    session: SessionId,
    move_number: Move,
    phase: Phase,
    items: Vec<TimelineItem>,
    kept_items: Vec<Value>,
    fields: Map<String, Value>,
    timer_restored: bool,
}

impl WhiteCell {
    /// Workspace for a session and move; binds the store to the session
    #[must_use]
    pub fn new(store: Arc<SessionKeyStore>, session: SessionId, mv: Move, config: &WargameConfig) -> Self {
        store.bind_session(session.clone());
        Self {
            writer: config.timeline_writer(Arc::clone(&store)),
            autosave: AutoSave::new(Role::WhiteCell, config.autosave_interval()),
            game_state: game_state_writer(Arc::clone(&store), &session),
            timer: TimerController::new(Arc::clone(&store), &session, config.timer),
            config: config.clone(),
            store,
            session,
            move_number: mv,
            phase: Phase::default(),
            items: Vec::new(),
            kept_items: Vec::new(),
            fields: Map::new(),
            timer_restored: false,
        }
    }

    /// With export destination for auto-saves and finalization files
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ExportSink>) -> Self {
        self.autosave = self.autosave.with_sink(sink);
        self
    }

    /// Shared countdown
    #[must_use]
    pub fn timer(&self) -> &Arc<TimerController> {
        &self.timer
    }

    /// Owning view of the game-state channel
    #[must_use]
    pub fn game_state(&self) -> &ReadWrite<GameState> {
        &self.game_state
    }

    /// Timeline items of the current record
    #[must_use]
    pub fn items(&self) -> &[TimelineItem] {
        &self.items
    }

    /// Form field value
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a form field; record fields cannot be overwritten
    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) -> bool {
        if RECORD_FIELDS.contains(&name) {
            warn!(field = name, "refusing to overwrite reserved white cell field");
            return false;
        }
        self.fields.insert(name.to_string(), value.into());
        true
    }

    fn persist(&mut self) {
        if let Err(e) = self.save() {
            error!(error = %e, "failed to save white cell data");
        }
    }

    /// Restore the stored countdown and resume it when it was running
    ///
    /// Outside a tokio runtime a running timer is restored but not ticked;
    /// readers keep counting it down from its `lastUpdate`.
    pub fn restore_timer(&mut self) -> RoleResult<TimerState> {
        let state = self.timer.restore()?;
        self.timer_restored = true;
        if state.running {
            if tokio::runtime::Handle::try_current().is_ok() {
                self.timer.start()?;
            } else {
                debug!(seconds = state.seconds, "no runtime, running timer restored without ticking");
            }
        }
        Ok(state)
    }

    fn ensure_timer_restored(&mut self) {
        if self.timer_restored {
            return;
        }
        match self.restore_timer() {
            Ok(state) => debug!(seconds = state.seconds, running = state.running, "timer restored"),
            Err(e) => {
                warn!(error = %e, "stored timer not restored");
                self.timer_restored = true;
            }
        }
    }

    /// Announce the current move and phase to every page
    pub fn publish(&self) -> RoleResult<GameState> {
        Ok(publish_game_state(&self.game_state, &self.store, self.move_number, self.phase)?)
    }

    /// Save, switch to `mv`, publish it and load its record
    pub fn change_move(&mut self, mv: Move) -> RoleResult<GameState> {
        if mv != self.move_number {
            self.save()?;
            self.move_number = mv;
        }
        let state = self.publish()?;
        self.load(Mode::Lenient)?;
        Ok(state)
    }

    /// Set and publish a new phase
    pub fn change_phase(&mut self, phase: Phase) -> RoleResult<GameState> {
        self.phase = phase;
        let state = self.publish()?;
        self.persist();
        Ok(state)
    }

    /// Record a capture, prefixing the faction label
    pub fn add_capture(
        &mut self,
        kind: ItemType,
        text: &str,
        faction: Option<FactionTag>,
    ) -> RoleResult<TimelineItem> {
        let text = text.trim();
        if text.is_empty() {
            return Err(InputError::MissingField("text").into());
        }
        let content = match faction {
            Some(tag) => format!("[{}] {text}", tag.label()),
            None => text.to_string(),
        };
        let clock = self.store.clock();
        let mut item = TimelineItem::new(kind)
            .with_time(clock.now().to_rfc3339())
            .with_content(content)
            .with_timestamp(clock.now_ms())
            .with_phase(self.phase)
            .with_team(Team::White);
        item.faction = faction.map(|tag| tag.as_str().to_string());
        item.move_number = Some(self.move_number);
        self.items.push(item.clone());
        self.persist();
        Ok(item)
    }

    fn rulings_keys(&self) -> [String; 2] {
        [
            Record::WhiteCellRulings.key(&self.session, self.move_number),
            legacy::white_cell_rulings(self.move_number),
        ]
    }

    /// Rulings of the current move
    #[must_use]
    pub fn rulings(&self) -> Vec<Ruling> {
        let entries = Value::Array(read_array(&self.store, &self.rulings_keys()));
        decode_list(Some(&entries), "ruling")
    }

    fn push_ruling(&self, ruling: &Ruling) -> RoleResult<()> {
        let mut rulings = read_array(&self.store, &self.rulings_keys());
        rulings.push(serde_json::to_value(ruling)?);
        self.store.try_set(
            &Record::WhiteCellRulings.key(&self.session, self.move_number),
            &rulings,
        )?;
        Ok(())
    }

    fn ruling_record(&self, subject: String, ruling: String, rationale: String) -> Ruling {
        let clock = self.store.clock();
        Ruling {
            subject,
            ruling,
            rationale,
            time: clock.now().to_rfc3339(),
            timestamp: clock.now_ms(),
            move_number: self.move_number.number(),
        }
    }

    /// Record a ruling and log it on the shared timeline
    pub async fn add_ruling(&mut self, draft: RulingDraft) -> RoleResult<Ruling> {
        let subject = draft.subject.trim();
        let text = draft.ruling.trim();
        if subject.is_empty() {
            return Err(InputError::MissingField("subject").into());
        }
        if text.is_empty() {
            return Err(InputError::MissingField("ruling").into());
        }
        let rationale = draft.rationale.trim().to_string();
        let ruling = self.ruling_record(subject.to_string(), text.to_string(), rationale.clone());
        self.push_ruling(&ruling)?;

        let event = TimelineItem::new(ItemType::Ruling)
            .with_phase(Phase::Adjudication)
            .with_title(format!("Ruling: {subject}"))
            .with_content(text)
            .with_team(Team::White)
            .with_refs(json!({ "rationale": rationale }));
        if let Err(e) = self.writer.append(&self.session, self.move_number, event).await {
            error!(error = %e, "failed to append ruling to timeline");
        }
        info!(subject, move_number = %self.move_number, "ruling recorded");
        Ok(ruling)
    }

    /// Adjudications of the current move
    #[must_use]
    pub fn adjudications(&self) -> Vec<Adjudication> {
        let entries = Value::Array(read_array(
            &self.store,
            &[
                Record::Adjudications.key(&self.session, self.move_number),
                legacy::adjudications(self.move_number),
            ],
        ));
        decode_list(Some(&entries), "adjudication")
    }

    /// Store an adjudication and log a summary ruling
    pub fn submit_adjudication(&mut self, draft: AdjudicationDraft) -> RoleResult<Adjudication> {
        draft.validate()?;
        if draft.structural_impacts.values().all(StructuralImpact::is_blank) {
            warn!(action = %draft.action_id, "adjudication submitted without structural impacts");
        }
        let adjudication = Adjudication {
            action_id: draft.action_id,
            vulnerabilities: draft.vulnerabilities,
            interdependencies: draft.interdependencies,
            structural_impacts: draft.structural_impacts,
            outcome: draft.outcome.trim().to_string(),
            narrative: draft.narrative.trim().to_string(),
            timestamp: self.store.clock().now().to_rfc3339(),
            move_number: self.move_number.number(),
            phase: self.phase,
        };

        let mut stored = read_array(
            &self.store,
            &[
                Record::Adjudications.key(&self.session, self.move_number),
                legacy::adjudications(self.move_number),
            ],
        );
        stored.push(serde_json::to_value(&adjudication)?);
        self.store.try_set(
            &Record::Adjudications.key(&self.session, self.move_number),
            &stored,
        )?;

        let mut summary: String = adjudication.narrative.chars().take(RULING_SUMMARY_CHARS).collect();
        if adjudication.narrative.chars().count() > RULING_SUMMARY_CHARS {
            summary.push_str("...");
        }
        let ruling = self.ruling_record(
            format!("Adjudication: {}", adjudication.outcome),
            summary,
            format!(
                "Structural impacts and interdependencies assessed. Outcome: {}",
                adjudication.outcome
            ),
        );
        self.push_ruling(&ruling)?;

        info!(action = %adjudication.action_id, outcome = %adjudication.outcome, "adjudication stored");
        self.store.notifier().info(MSG_ADJUDICATION_SAVED);
        Ok(adjudication)
    }

    /// Messages sent to BLUE this move
    #[must_use]
    pub fn communications(&self) -> Vec<Communication> {
        let entries = Value::Array(read_array(
            &self.store,
            &[
                Record::Communications.key(&self.session, self.move_number),
                legacy::communications(self.move_number),
            ],
        ));
        decode_list(Some(&entries), "communication")
    }

    /// Send a message to BLUE and log it on the shared timeline
    pub async fn send_response(&mut self, draft: ResponseDraft) -> RoleResult<Communication> {
        let title = draft.title.trim();
        let content = draft.content.trim();
        if title.is_empty() {
            return Err(InputError::MissingField("title").into());
        }
        if content.is_empty() {
            return Err(InputError::MissingField("content").into());
        }
        let now = self.store.clock().now().to_rfc3339();
        let communication = Communication {
            kind: draft.kind,
            title: title.to_string(),
            content: content.to_string(),
            move_number: self.move_number.number(),
            timestamp: now.clone(),
            responded_at: now,
            from: "WHITE Cell".into(),
            to: "BLUE Team".into(),
        };

        let mut stored = read_array(
            &self.store,
            &[
                Record::Communications.key(&self.session, self.move_number),
                legacy::communications(self.move_number),
            ],
        );
        stored.push(serde_json::to_value(&communication)?);
        self.store.try_set(
            &Record::Communications.key(&self.session, self.move_number),
            &stored,
        )?;

        let event = TimelineItem::new(ItemType::WhiteFeedback)
            .with_phase(Phase::Adjudication)
            .with_title(title)
            .with_content(content)
            .with_team(Team::White)
            .with_refs(json!({ "to": "blue" }));
        if let Err(e) = self.writer.append(&self.session, self.move_number, event).await {
            error!(error = %e, "failed to append response to timeline");
        }
        self.store.notifier().info(MSG_RESPONSE_SENT);
        Ok(communication)
    }

    /// Information requests BLUE submitted this move
    #[must_use]
    pub fn submitted_requests(&self) -> Vec<InfoRequest> {
        mirrored_requests(&self.store, &self.session, self.move_number)
    }

    /// Actions BLUE submitted this move
    ///
    /// Reads the submission record (following its `dataRef`), then the
    /// Facilitator record, then the legacy submission keys.
    #[must_use]
    pub fn submitted_actions(&self) -> Vec<Action> {
        let submission = self
            .store
            .get_value(&Record::BlueActions.key(&self.session, self.move_number));
        if let Some(submission) = &submission {
            if let Some(actions) = submission.get("actions") {
                return decode_list(Some(actions), "submitted action");
            }
            if let Some(data_ref) = submission.get("dataRef").and_then(Value::as_str) {
                if let Some(record) = self.store.get_value(data_ref) {
                    return decode_list(record.get("actions"), "submitted action");
                }
            }
        }
        if let Some(record) = FacilitatorRecord::read(&self.store, &self.session, self.move_number) {
            if !record.actions.is_empty() {
                return record.actions;
            }
        }
        match first_present(
            &self.store,
            &[
                legacy::blue_actions(self.move_number),
                legacy::blue_actions_submitted(self.move_number),
            ],
        ) {
            Some((_, value)) => decode_list(value.get("actions"), "legacy action"),
            None => Vec::new(),
        }
    }

    /// Merge the last broadcast append into the local items
    ///
    /// Returns whether an item was added.
    pub fn apply_timeline_update(&mut self) -> bool {
        let Some(update) = self.store.get_opt::<TimelineUpdate>(keys::TIMELINE_UPDATE) else {
            return false;
        };
        if update.move_number != self.move_number {
            return false;
        }
        let identity = update.item.identity();
        if self.items.iter().any(|item| item.identity() == identity) {
            return false;
        }
        self.items.push(update.item);
        true
    }

    /// Per-team view: BLUE sources, the shared timeline and local captures
    #[must_use]
    pub fn team_timelines(&self) -> TeamTimelines {
        let feed = Feed::new(&self.store, self.session.clone(), self.move_number);
        partition_by_team(aggregate([
            feed.blue_sources(self.phase),
            feed.white_cell_items(None),
            self.items.clone(),
        ]))
    }

    /// Mark the move complete under the `_finalized` key
    pub fn finalize_move(&mut self) -> RoleResult<Finalization> {
        self.save()?;
        let Some((_, Value::Object(mut data))) = first_present(
            &self.store,
            &[
                Record::WhiteCell.key(&self.session, self.move_number),
                legacy::white_cell(self.move_number),
            ],
        ) else {
            return Err(InputError::NothingToSubmit.into());
        };
        let summary = Finalization {
            move_number: self.move_number,
            timeline_count: data
                .get(TIMELINE_FIELD)
                .and_then(Value::as_array)
                .map_or(0, Vec::len),
            rulings: self.rulings().len(),
            communications: read_array(
                &self.store,
                &[Record::WhiteCellFeedback.key(&self.session, self.move_number)],
            )
            .len(),
        };

        let now = self.store.clock().now();
        data.insert("finalized".into(), Value::Bool(true));
        data.insert("finalizedAt".into(), json!(now.to_rfc3339()));
        let data = Value::Object(data);
        self.store
            .try_set(&keys::white_cell_finalized(&self.session, self.move_number), &data)?;

        if let Some(sink) = self.autosave.sink() {
            let filename = Role::WhiteCell.submission_filename(self.move_number, now);
            let written = serde_json::to_string_pretty(&data)
                .map_err(RoleError::from)
                .and_then(|text| sink.write(&filename, &text).map_err(RoleError::from));
            if let Err(e) = written {
                warn!(filename, error = %e, "could not write finalization file");
            }
        }
        info!(move_number = %self.move_number, timeline = summary.timeline_count, "move finalized");
        self.store
            .notifier()
            .info(&format!("Move {} finalized.", self.move_number));
        Ok(summary)
    }

    fn reset_target(&self, key: &str) -> bool {
        match keys::split_scoped(key) {
            Some((prefix, owner)) => {
                owner == self.session.as_str()
                    && (RESET_RECORDS.iter().any(|record| record.prefix() == prefix)
                        || OTHER_TEAM_RESET.contains(&prefix))
            }
            None => LEGACY_RESET.iter().any(|pattern| pattern.is_match(key)),
        }
    }

    /// Clear White Cell and team submission data, then return to move 1, phase 1
    ///
    /// Removes legacy unscoped keys and this session's scoped keys; other
    /// sessions are left alone. Returns the number of keys removed.
    pub fn reset_all(&mut self) -> RoleResult<usize> {
        let targets: Vec<String> = self
            .store
            .keys()
            .into_iter()
            .filter(|key| self.reset_target(key))
            .collect();
        let removed = targets.iter().filter(|key| self.store.remove(key)).count();

        self.timer.reset()?;
        self.items.clear();
        self.kept_items.clear();
        self.fields.clear();
        self.move_number = Move::FIRST;
        self.phase = Phase::default();
        self.publish()?;
        warn!(removed, session = %self.session, "white cell data reset");
        Ok(removed)
    }

    /// Export every move with rulings, communications and adjudications
    pub fn export(&mut self, sink: &dyn ExportSink) -> RoleResult<String> {
        self.save()?;
        let mut moves = Map::new();
        let mut per_move = Vec::new();
        let mut rulings = Vec::new();
        let mut communications = Vec::new();
        let mut adjudications = Vec::new();
        for mv in Move::all() {
            if let Some((_, data)) = first_present(
                &self.store,
                &[Record::WhiteCell.key(&self.session, mv), legacy::white_cell(mv)],
            ) {
                per_move.push((mv, data.clone()));
                moves.insert(mv.to_string(), data);
            }
            rulings.extend(read_array(
                &self.store,
                &[
                    Record::WhiteCellRulings.key(&self.session, mv),
                    legacy::white_cell_rulings(mv),
                ],
            ));
            communications.extend(read_array(
                &self.store,
                &[Record::Communications.key(&self.session, mv), legacy::communications(mv)],
            ));
            communications.extend(
                read_array(&self.store, &[Record::WhiteCellFeedback.key(&self.session, mv)])
                    .iter()
                    .map(|feedback| {
                        json!({
                            "title": feedback.get("summary").cloned().unwrap_or(Value::Null),
                            "type": "white_feedback",
                            "content": feedback.get("notes").cloned().unwrap_or_else(|| json!("")),
                            "move": feedback.get("move").cloned().unwrap_or(Value::Null),
                            "timestamp": feedback.get("timestamp").cloned().unwrap_or(Value::Null),
                        })
                    }),
            );
            adjudications.extend(read_array(
                &self.store,
                &[Record::Adjudications.key(&self.session, mv), legacy::adjudications(mv)],
            ));
        }
        rulings.extend(read_array(&self.store, &["whiteCellRulings".to_string()]));
        if moves.is_empty() && rulings.is_empty() && communications.is_empty() {
            return Err(InputError::NothingToExport.into());
        }

        let now = self.store.clock().now();
        let document = json!({
            "exported": now.to_rfc3339(),
            "exportedBy": Role::WhiteCell.exporter(),
            "sessionId": self.session,
            "currentMove": self.move_number,
            "currentPhase": self.phase,
            "allMoves": moves,
            "rulings": rulings,
            "communications": communications,
            "adjudications": adjudications,
            "decisionTimeline": decision_timeline(per_move.iter().map(|(mv, data)| (*mv, data))),
        });
        let filename = export_filename(Role::WhiteCell.export_prefix(), &self.session, now);
        sink.write(&filename, &serde_json::to_string_pretty(&document)?)?;
        self.store.notifier().info(MSG_EXPORTED);
        Ok(filename)
    }

    /// Pull in items other pages appended since the last load
    fn merge_stored_items(&mut self) {
        let stored = self
            .store
            .get_value(&Record::WhiteCell.key(&self.session, self.move_number))
            .and_then(|record| record.get(TIMELINE_FIELD).map(decode_items))
            .unwrap_or_default();
        let known: HashSet<Identity> = self.items.iter().map(TimelineItem::identity).collect();
        let appended: Vec<TimelineItem> = stored
            .into_iter()
            .filter(|item| !known.contains(&item.identity()))
            .collect();
        if !appended.is_empty() {
            info!(count = appended.len(), "merging timeline items appended by other pages");
            self.items.extend(appended);
        }
    }
}

impl Workspace for WhiteCell {
    fn role(&self) -> Role {
        Role::WhiteCell
    }

    fn session(&self) -> &SessionId {
        &self.session
    }

    fn move_number(&self) -> Move {
        self.move_number
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    fn save(&mut self) -> RoleResult<()> {
        self.ensure_timer_restored();
        self.merge_stored_items();
        let record = self.record();
        self.store
            .try_set(&Record::WhiteCell.key(&self.session, self.move_number), &record)?;
        if let Err(e) = self.timer.persist() {
            warn!(error = %e, "timer state not saved");
        }
        self.autosave
            .maybe_export(&self.store, &self.session, self.move_number, &record);
        Ok(())
    }

    fn load(&mut self, mode: Mode) -> RoleResult<bool> {
        self.ensure_timer_restored();
        self.items.clear();
        self.kept_items.clear();
        self.fields.clear();

        let current = Record::WhiteCell.key(&self.session, self.move_number);
        let Some((key, stored)) = first_present(
            &self.store,
            &[current.clone(), legacy::white_cell(self.move_number)],
        ) else {
            return Ok(false);
        };
        if key != current && self.store.set(&current, &stored) {
            info!(from = key, to = current, "copied legacy white cell record forward");
        }

        let schema = Schema::new()
            .field_or(TIMELINE_FIELD, FieldType::Array, json!([]))
            .field_or("currentPhase", FieldType::Number, json!(1))
            .field("move", FieldType::Number)
            .field("timestamp", FieldType::String);
        let mut validated = match schema.validate(&stored, mode) {
            Ok(validated) => validated,
            Err(e) => {
                warn!(key, error = %e, "stored white cell record refused");
                self.store.notifier().warning(MSG_VALIDATION_FAILED);
                return Err(e.into());
            }
        };
        if !validated.is_clean() {
            self.store.notifier().warning(MSG_VALIDATION_FAILED);
        }

        if let Some(phase) = validated.record.get("currentPhase") {
            self.phase = Phase::normalize(phase);
        }
        (self.items, self.kept_items) = validated
            .record
            .get(TIMELINE_FIELD)
            .map(split_items)
            .unwrap_or_default();
        for name in RECORD_FIELDS {
            validated.record.remove(name);
        }
        self.fields = validated.record;
        info!(key, items = self.items.len(), "loaded white cell data");
        Ok(true)
    }

    fn record(&self) -> Value {
        let mut record = Map::new();
        record.insert("timestamp".into(), json!(self.store.clock().now().to_rfc3339()));
        record.insert("timerRemaining".into(), json!(self.timer.state().seconds));
        record.insert(
            TIMELINE_FIELD.into(),
            serde_json::to_value(&self.items).unwrap_or_else(|_| json!([])),
        );
        record.insert("currentPhase".into(), json!(self.phase));
        record.insert("move".into(), json!(self.move_number));
        for (name, value) in &self.fields {
            record.insert(name.clone(), value.clone());
        }
        let mut record = Value::Object(record);
        append_kept(&mut record, TIMELINE_FIELD, &self.kept_items);
        record
    }

    fn timeline(&self) -> Vec<TimelineItem> {
        let feed = Feed::new(&self.store, self.session.clone(), self.move_number);
        aggregate([
            self.items.clone(),
            feed.white_cell_items(None),
            feed.blue_sources(self.phase),
        ])
    }

    fn poll_updates(&mut self) -> usize {
        usize::from(self.apply_timeline_update())
    }

    fn rebind(&mut self, session: SessionId) {
        self.store.bind_session(session.clone());
        self.game_state = game_state_writer(Arc::clone(&self.store), &session);
        if let Err(e) = self.timer.pause() {
            warn!(error = %e, "could not pause timer of previous session");
        }
        self.timer = TimerController::new(Arc::clone(&self.store), &session, self.config.timer);
        self.timer_restored = false;
        self.session = session;
        self.ensure_timer_restored();
    }

    fn retarget(&mut self, mv: Move) {
        self.move_number = mv;
    }
}

impl std::fmt::Debug for WhiteCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhiteCell")
            .field("session", &self.session)
            .field("move_number", &self.move_number)
            .field("phase", &self.phase)
            .field("items", &self.items.len())
            .field("timer", &self.timer.state())
            .finish_non_exhaustive()
    }
}
