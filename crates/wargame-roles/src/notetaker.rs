//! BLUE team Notetaker workspace
//!
//! Captures are timeline items kept newest first. Free-form observation
//! fields (leadership, alliance engagement, red activity) are stored next to
//! them in the same record and feed the derived reports of the export.

use crate::autosave::AutoSave;
use crate::config::WargameConfig;
use crate::error::{InputError, RoleError, RoleResult};
use crate::facilitator::{mirrored_requests, Action, FacilitatorRecord};
use crate::role::Role;
use crate::schema::{FieldType, Mode, Schema};
use crate::workspace::{
    append_kept, blue_items_all_moves, decision_timeline, first_present, IdSource, Workspace,
    MSG_VALIDATION_FAILED,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use wargame_store::keys::{legacy, Record};
use wargame_store::{export_filename, ExportSink, Move, Phase, SessionId, SessionKeyStore};
use wargame_timeline::{aggregate, split_items, Feed, ItemId, ItemType, Team, TimelineItem, TimelineWriter, TIMELINE_FIELD};

/// Shown after a successful submission
pub const MSG_NOTES_SUBMITTED: &str = "Successfully submitted notes to WHITE Cell";
/// Shown after an export
pub const MSG_NOTES_EXPORTED: &str = "Export complete. All Team Dynamics and Alliance Engagement data included.";

const NOT_RECORDED: &str = "Not recorded";
const DEFAULT_SCALE: i64 = 5;
const RESERVED_FIELDS: [&str; 2] = ["phase", TIMELINE_FIELD];

/// What a capture records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureKind {
    /// Free note
    #[default]
    Note,
    /// Key moment
    Moment,
    /// Verbatim quote
    Quote,
    /// Information the team asked for
    RequestInfo,
}

impl CaptureKind {
    fn item_type(self) -> ItemType {
        match self {
            Self::Note => ItemType::Note,
            Self::Moment => ItemType::Moment,
            Self::Quote => ItemType::Quote,
            Self::RequestInfo => ItemType::RequestInfo,
        }
    }
}

/// Canned openings for a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTemplate {
    /// Disagreement between two people
    Disagreement,
    /// Team consensus
    Consensus,
    /// Question raised
    Question,
    /// Concern expressed
    Concern,
}

impl CaptureTemplate {
    /// Text inserted into the capture box
    #[must_use]
    pub fn text(self) -> &'static str {
        match self {
            Self::Disagreement => "[DISAGREEMENT] Between ___ and ___ regarding: ",
            Self::Consensus => "[CONSENSUS] Team agreed on: ",
            Self::Question => "[QUESTION RAISED] ___ asked: ",
            Self::Concern => "[CONCERN] ___ expressed concern about: ",
        }
    }
}

/// Form input for a capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureDraft {
    /// Kind of capture
    pub kind: CaptureKind,
    /// Captured text
    pub text: String,
    /// Faction tag
    pub faction: Option<String>,
    /// Debate marker
    pub marker: Option<String>,
}

impl CaptureDraft {
    /// Note with the given text
    #[must_use]
    pub fn note(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// With kind
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: CaptureKind) -> Self {
        self.kind = kind;
        self
    }

    /// With faction tag
    #[inline]
    #[must_use]
    pub fn with_faction(mut self, faction: impl Into<String>) -> Self {
        self.faction = Some(faction.into());
        self
    }

    /// With debate marker
    #[inline]
    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }
}

/// Analysis section announced on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisSection {
    /// Leadership and internal debate
    TeamDynamics,
    /// Allies, adversaries and outcomes
    AllianceEngagement,
}

impl AnalysisSection {
    /// Display name
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::TeamDynamics => "Team Dynamics",
            Self::AllianceEngagement => "Alliance Engagement",
        }
    }
}

/// Summary of a notes submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesSubmission {
    /// Captures submitted
    pub timeline_count: usize,
    /// Whether team dynamics were documented
    pub has_dynamics: bool,
    /// Whether alliance engagement was documented
    pub has_alliance: bool,
}

/// Falsy in the loose sense of the stored pages: null, false, 0, "" or absent
fn truthy(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

fn or(data: &Value, field: &str, default: impl Into<Value>) -> Value {
    truthy(data.get(field)).cloned().unwrap_or_else(|| default.into())
}

fn any_present(data: &Value, fields: &[&str]) -> bool {
    fields.iter().any(|field| truthy(data.get(*field)).is_some())
}

/// Leadership, divided government and power management per move
#[must_use]
pub fn team_dynamics_report(moves: &Map<String, Value>) -> Value {
    let report: Map<String, Value> = moves
        .iter()
        .map(|(mv, data)| {
            let entry = json!({
                "leadership": {
                    "primaryLeader": or(data, "leader", NOT_RECORDED),
                    "leadershipNotes": or(data, "leadershipNotes", ""),
                    "decisionStyle": or(data, "decisionStyle", NOT_RECORDED),
                },
                "dividedGovernment": {
                    "mainDisagreements": or(data, "disagreements", ""),
                    "debateIntensity": or(data, "debateIntensity", DEFAULT_SCALE),
                    "consensusMethod": or(data, "consensus", ""),
                },
                "powerManagement": {
                    "savingForLater": or(data, "powersave", "Not discussed"),
                    "strategy": or(data, "powerStrategy", ""),
                },
                "efficiency": {},
                "scales": {
                    "debateVsExecute": or(data, "debateVsExecute", DEFAULT_SCALE),
                },
            });
            (mv.clone(), entry)
        })
        .collect();
    Value::Object(report)
}

/// Ally responses, red activity and outcomes per move
#[must_use]
pub fn alliance_report(moves: &Map<String, Value>) -> Value {
    let report: Map<String, Value> = moves
        .iter()
        .map(|(mv, data)| {
            let entry = json!({
                "allyResponses": {
                    "feedback": or(data, "allyFeedback", ""),
                    "impactOnActions": or(data, "ally-impact", NOT_RECORDED),
                    "blueReaction": or(data, "blueReactionAllies", ""),
                    "changesMade": or(data, "allyBasedChanges", ""),
                    "coalitionImpact": or(data, "coalitionImpact", DEFAULT_SCALE),
                },
                "redActivity": {
                    "reportsHeard": or(data, "redReports", ""),
                    "blueAssessment": or(data, "blueRedAssessment", ""),
                    "triggeredChanges": or(data, "red-impact", NOT_RECORDED),
                    "counterActions": or(data, "redCounterActions", ""),
                },
                "outcomes": {
                    "whiteCellFeedback": or(data, "whiteOutcomes", ""),
                    "blueReaction": or(data, "blueReactionOutcomes", ""),
                },
                "gameState": {
                    "updates": or(data, "gameState", ""),
                },
            });
            (mv.clone(), entry)
        })
        .collect();
    Value::Object(report)
}

/// Condensed leadership and debate profile per move
#[must_use]
pub fn faction_analysis(moves: &Map<String, Value>) -> Value {
    let report: Map<String, Value> = moves
        .iter()
        .map(|(mv, data)| {
            let entry = json!({
                "leadership": or(data, "leader", NOT_RECORDED),
                "decisionStyle": or(data, "decisionStyle", NOT_RECORDED),
                "debateIntensity": or(data, "debateIntensity", NOT_RECORDED),
                "debateVsExecute": or(data, "debateVsExecute", NOT_RECORDED),
            });
            (mv.clone(), entry)
        })
        .collect();
    Value::Object(report)
}

/// Notetaker workspace
pub struct Notetaker {
    store: Arc<SessionKeyStore>,
    writer: TimelineWriter,
    autosave: AutoSave,
    session: SessionId,
    move_number: Move,
    phase: Phase,
    captures: Vec<TimelineItem>,
    kept_captures: Vec<Value>,
    fields: Map<String, Value>,
    ids: IdSource,
}

impl Notetaker {
    /// Empty workspace for a session and move
    #[must_use]
    pub fn new(store: Arc<SessionKeyStore>, session: SessionId, mv: Move, config: &WargameConfig) -> Self {
        Self {
            writer: config.timeline_writer(Arc::clone(&store)),
            autosave: AutoSave::new(Role::Notetaker, config.autosave_interval()),
            store,
            session,
            move_number: mv,
            phase: Phase::default(),
            captures: Vec::new(),
            kept_captures: Vec::new(),
            fields: Map::new(),
            ids: IdSource::default(),
        }
    }

    /// With export destination for auto-saves and submission copies
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ExportSink>) -> Self {
        self.autosave = self.autosave.with_sink(sink);
        self
    }

    /// Captures, newest first
    #[must_use]
    pub fn captures(&self) -> &[TimelineItem] {
        &self.captures
    }

    /// Observation field value
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Every observation field
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn persist(&mut self) {
        if let Err(e) = self.save() {
            error!(error = %e, "failed to save notes");
        }
    }

    fn new_item(&mut self, item_type: ItemType) -> TimelineItem {
        let clock = self.store.clock();
        let (now_ms, time) = (clock.now_ms(), clock.now().to_rfc3339());
        let id = self.ids.next(now_ms);
        TimelineItem::new(item_type)
            .with_id(ItemId::number(id))
            .with_timestamp(id)
            .with_time(time)
            .with_phase(self.phase)
    }

    /// Record a capture at the top of the list
    pub fn add_capture(&mut self, draft: CaptureDraft) -> RoleResult<TimelineItem> {
        let text = draft.text.trim();
        if text.is_empty() {
            return Err(InputError::MissingField("text").into());
        }
        let mut item = self.new_item(draft.kind.item_type()).with_content(text);
        item.faction = draft.faction.filter(|f| !f.is_empty());
        item.marker = draft.marker.filter(|m| !m.is_empty());
        self.captures.insert(0, item.clone());
        self.persist();
        Ok(item)
    }

    /// Save, then log an analysis update on the timeline
    pub fn add_analysis(&mut self, section: AnalysisSection) -> TimelineItem {
        self.persist();
        let item = self
            .new_item(ItemType::Analysis)
            .with_content(format!("{} analysis updated", section.label()));
        self.captures.insert(0, item.clone());
        self.persist();
        item
    }

    /// Set an observation field; `phase` and the capture list cannot be overwritten
    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) -> bool {
        if RESERVED_FIELDS.contains(&name) {
            warn!(field = name, "refusing to overwrite reserved notes field");
            return false;
        }
        self.fields.insert(name.to_string(), value.into());
        self.persist();
        true
    }

    /// Facilitator actions of the current move
    #[must_use]
    pub fn facilitator_actions(&self) -> Vec<Action> {
        FacilitatorRecord::read(&self.store, &self.session, self.move_number)
            .map(|record| record.actions)
            .unwrap_or_default()
    }

    /// Mark the notes final and announce them to the White Cell
    pub async fn submit(&mut self) -> RoleResult<NotesSubmission> {
        self.save()?;
        let Some(Value::Object(mut data)) = self
            .store
            .get_value(&Record::Notes.key(&self.session, self.move_number))
        else {
            return Err(InputError::NothingToSubmit.into());
        };
        let snapshot = Value::Object(data.clone());
        let summary = NotesSubmission {
            timeline_count: self.captures.len(),
            has_dynamics: any_present(&snapshot, &["leader", "decisionStyle", "disagreements"]),
            has_alliance: any_present(&snapshot, &["allyFeedback", "redReports", "whiteOutcomes"]),
        };

        data.insert("submitted".into(), Value::Bool(true));
        data.insert("submittedAt".into(), json!(self.store.clock().now().to_rfc3339()));
        data.insert("submittedBy".into(), json!(Role::Notetaker.exporter()));
        let data = Value::Object(data);
        self.store
            .try_set(&Record::NotesSubmission.key(&self.session, self.move_number), &data)?;

        let event = TimelineItem::new(ItemType::Request)
            .with_phase(self.phase)
            .with_title(format!("Notetaker submitted notes (timeline {})", summary.timeline_count))
            .with_content("Notes ready for WHITE review")
            .with_team(Team::Blue)
            .with_refs(json!({
                "submittedBy": "notetaker",
                "timelineCount": summary.timeline_count,
            }));
        if let Err(e) = self.writer.append(&self.session, self.move_number, event).await {
            error!(error = %e, "failed to append notes submission to timeline");
        }

        if let Some(sink) = self.autosave.sink() {
            let filename = Role::Notetaker.submission_filename(self.move_number, self.store.clock().now());
            let written = serde_json::to_string_pretty(&data)
                .map_err(RoleError::from)
                .and_then(|text| sink.write(&filename, &text).map_err(RoleError::from));
            if let Err(e) = written {
                warn!(filename, error = %e, "could not write submission copy");
            }
            if let Err(e) = self
                .autosave
                .export_now(&self.store, &self.session, self.move_number, &snapshot)
            {
                warn!(error = %e, "auto-save after submission failed");
            }
        }

        info!(
            timeline_count = summary.timeline_count,
            move_number = %self.move_number,
            "submitted notes to white cell"
        );
        self.store.notifier().info(MSG_NOTES_SUBMITTED);
        Ok(summary)
    }

    /// Export every move with the derived reports; returns the filename written
    pub fn export(&mut self, sink: &dyn ExportSink) -> RoleResult<String> {
        self.save()?;
        let mut moves = Map::new();
        let mut facilitator_actions = Map::new();
        let mut per_move = Vec::new();
        for mv in Move::all() {
            if let Some(data) = self.store.get_value(&Record::Notes.key(&self.session, mv)) {
                per_move.push((mv, data.clone()));
                moves.insert(mv.to_string(), data);
            }
            if let Some(actions) = self
                .store
                .get_value(&Record::Actions.key(&self.session, mv))
                .and_then(|record| record.get("actions").cloned())
            {
                facilitator_actions.insert(mv.to_string(), actions);
            }
        }
        if moves.is_empty() {
            return Err(InputError::NothingToExport.into());
        }

        let now = self.store.clock().now();
        let document = json!({
            "exported": now.to_rfc3339(),
            "exportedBy": Role::Notetaker.exporter(),
            "sessionId": self.session,
            "gameMetadata": {
                "totalMoves": Move::LAST.number(),
                "currentMove": self.move_number,
                "currentPhase": self.phase,
            },
            "allMoves": moves,
            "facilitatorActions": facilitator_actions,
            "timelineItems": blue_items_all_moves(&self.store, &self.session),
            "decisionTimeline": decision_timeline(per_move.iter().map(|(mv, data)| (*mv, data))),
            "teamDynamics": team_dynamics_report(&moves),
            "allianceEngagement": alliance_report(&moves),
            "factionAnalysis": faction_analysis(&moves),
            "metadata": {
                "exportVersion": "1.0",
                "includesFacilitatorActions": true,
                "includesTimeline": true,
            },
        });
        let filename = export_filename(Role::Notetaker.export_prefix(), &self.session, now);
        sink.write(&filename, &serde_json::to_string_pretty(&document)?)?;
        self.store.notifier().info(MSG_NOTES_EXPORTED);
        Ok(filename)
    }

    fn facilitator_projection(&self) -> Vec<TimelineItem> {
        let mut items: Vec<TimelineItem> = mirrored_requests(&self.store, &self.session, self.move_number)
            .iter()
            .map(|request| request.timeline_item())
            .collect();
        if let Some(record) = FacilitatorRecord::read(&self.store, &self.session, self.move_number) {
            items.extend(record.timeline_items().into_iter().map(|mut item| {
                item.faction = Some("blue".into());
                item
            }));
        }
        items
    }
}

impl Workspace for Notetaker {
    fn role(&self) -> Role {
        Role::Notetaker
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
        let record = self.record();
        self.store
            .try_set(&Record::Notes.key(&self.session, self.move_number), &record)?;
        self.autosave
            .maybe_export(&self.store, &self.session, self.move_number, &record);
        Ok(())
    }

    fn load(&mut self, mode: Mode) -> RoleResult<bool> {
        self.captures.clear();
        self.kept_captures.clear();
        self.fields.clear();

        let current = Record::Notes.key(&self.session, self.move_number);
        let Some((key, stored)) = first_present(
            &self.store,
            &[current.clone(), legacy::blue_facilitator(self.move_number)],
        ) else {
            return Ok(false);
        };
        let schema = Schema::new()
            .field_or(TIMELINE_FIELD, FieldType::Array, json!([]))
            .field("phase", FieldType::Number);
        let mut validated = match schema.validate(&stored, mode) {
            Ok(validated) => validated,
            Err(e) => {
                warn!(key, error = %e, "stored notes refused");
                self.store.notifier().warning(MSG_VALIDATION_FAILED);
                return Err(e.into());
            }
        };
        if !validated.is_clean() {
            self.store.notifier().warning(MSG_VALIDATION_FAILED);
        }

        if let Some(phase) = validated.record.remove("phase") {
            self.phase = Phase::normalize(&phase);
        }
        let (items, kept) = validated
            .record
            .remove(TIMELINE_FIELD)
            .map(|value| split_items(&value))
            .unwrap_or_default();
        self.kept_captures = kept;
        for stamp in items.iter().filter_map(|item| item.timestamp) {
            self.ids.observe(stamp);
        }
        self.captures = items;
        if key == current {
            self.fields = validated.record;
        }
        info!(key, captures = self.captures.len(), fields = self.fields.len(), "loaded notes");
        Ok(true)
    }

    fn record(&self) -> Value {
        let mut record = Map::new();
        record.insert("phase".into(), json!(self.phase));
        record.insert(
            TIMELINE_FIELD.into(),
            serde_json::to_value(&self.captures).unwrap_or_else(|_| json!([])),
        );
        for (name, value) in &self.fields {
            record.insert(name.clone(), value.clone());
        }
        let mut record = Value::Object(record);
        append_kept(&mut record, TIMELINE_FIELD, &self.kept_captures);
        record
    }

    fn timeline(&self) -> Vec<TimelineItem> {
        let feed = Feed::new(&self.store, self.session.clone(), self.move_number);
        aggregate([
            self.captures.clone(),
            self.facilitator_projection(),
            feed.white_cell_items(Some(Team::Blue)),
        ])
    }

    fn rebind(&mut self, session: SessionId) {
        self.session = session;
    }

    fn retarget(&mut self, mv: Move) {
        self.move_number = mv;
    }
}

impl std::fmt::Debug for Notetaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notetaker")
            .field("session", &self.session)
            .field("move_number", &self.move_number)
            .field("phase", &self.phase)
            .field("captures", &self.captures.len())
            .field("fields", &self.fields.len())
            .finish_non_exhaustive()
    }
}
