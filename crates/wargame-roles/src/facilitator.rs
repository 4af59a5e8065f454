//! BLUE team Facilitator workspace
//!
//! Holds the move's actions, information requests and observations. Every
//! mutation is persisted to `actions_session_S_move_M`; requests are also
//! mirrored where the White Cell and Notetaker read them. Deletes and edits
//! push an inverse onto a bounded undo history.

use crate::autosave::AutoSave;
use crate::config::WargameConfig;
use crate::error::{ActionIssue, InputError, RoleError, RoleResult};
use crate::role::Role;
use crate::schema::{FieldType, Mode, Schema};
use crate::undo::{PushOutcome, UndoEntry, UndoStack};
use crate::workspace::{
    append_kept, blue_items_all_moves, decode_list, first_present, read_array, split_list, IdSource,
    Workspace, MSG_EXPORTED, MSG_VALIDATION_FAILED,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use wargame_store::keys::{self, legacy, Record};
use wargame_store::{export_filename, ExportSink, Move, Phase, SessionId, SessionKeyStore};
use wargame_timeline::{aggregate, Feed, ItemType, Team, TimelineItem, TimelineWriter};

/// Shown when undo is requested with an empty history
pub const MSG_NOTHING_TO_UNDO: &str = "Nothing to undo";
/// Shown after an undo
pub const MSG_UNDONE: &str = "Undone";
/// Undo overflow notice
#[must_use]
pub fn undo_limit_message(limit: usize) -> String {
    format!("Undo limit reached ({limit} actions). Oldest actions will be removed.")
}

/// A planned BLUE action
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Action {
    /// Creation time in epoch milliseconds
    pub id: i64,
    /// 1-based position, resequenced on delete
    pub number: usize,
    /// Policy mechanism
    pub mechanism: String,
    /// Economic sector
    pub sector: String,
    /// Targeted parties
    pub targets: Vec<String>,
    /// Exposure level
    pub exposure: String,
    /// Intended goal
    pub goal: String,
    /// Expected outcomes
    pub outcomes: String,
    /// Contingency plans
    pub contingencies: String,
    /// Phase at creation or last edit
    pub phase: Phase,
    /// Display timestamp
    pub timestamp: String,
}

impl Action {
    /// Required fields that are blank, in form order
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing: Vec<&'static str> = [
            ("mechanism", &self.mechanism),
            ("sector", &self.sector),
            ("goal", &self.goal),
            ("outcomes", &self.outcomes),
            ("contingencies", &self.contingencies),
            ("exposure", &self.exposure),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if self.targets.is_empty() {
            missing.push("targets");
        }
        missing
    }

    fn timeline_item(&self) -> TimelineItem {
        let goal = if self.goal.is_empty() { "No goal specified" } else { &self.goal };
        TimelineItem::new(ItemType::Action)
            .with_time(self.timestamp.clone())
            .with_timestamp(self.id)
            .with_phase(self.phase)
            .with_content(format!("Action {}: {goal}", self.number))
            .with_team(Team::Blue)
    }
}

/// Form input for an action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionDraft {
    /// Policy mechanism
    pub mechanism: String,
    /// Economic sector
    pub sector: String,
    /// Targeted parties
    pub targets: Vec<String>,
    /// Exposure level
    pub exposure: String,
    /// Intended goal
    pub goal: String,
    /// Expected outcomes
    pub outcomes: String,
    /// Contingency plans
    pub contingencies: String,
}

impl ActionDraft {
    /// Reject blank required fields and an empty target list
    pub fn validate(&self) -> Result<(), InputError> {
        for (name, value) in [
            ("mechanism", &self.mechanism),
            ("sector", &self.sector),
            ("goal", &self.goal),
            ("outcomes", &self.outcomes),
            ("contingencies", &self.contingencies),
            ("exposure", &self.exposure),
        ] {
            if value.trim().is_empty() {
                return Err(InputError::MissingField(name));
            }
        }
        if self.targets.is_empty() {
            return Err(InputError::EmptySelection("target"));
        }
        Ok(())
    }
}

/// A BLUE request for information
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InfoRequest {
    /// Creation time in epoch milliseconds
    pub id: i64,
    /// Priority label
    pub priority: String,
    /// Topic categories
    pub categories: Vec<String>,
    /// Request text
    pub details: String,
    /// Phase at creation
    pub phase: Phase,
    /// Display timestamp
    pub timestamp: String,
    /// Lifecycle status
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
}

impl InfoRequest {
    /// Timeline projection
    #[must_use]
    pub fn timeline_item(&self) -> TimelineItem {
        let mut item = TimelineItem::new(ItemType::RequestInfo)
            .with_content(self.details.clone())
            .with_phase(self.phase)
            .with_time(self.timestamp.clone())
            .with_timestamp(self.id)
            .with_team(Team::Blue);
        item.faction = Some("blue".into());
        item
    }
}

/// Form input for a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDraft {
    /// Priority label
    pub priority: String,
    /// Topic categories
    pub categories: Vec<String>,
    /// Request text
    pub details: String,
}

impl RequestDraft {
    /// Reject blank priority or details and an empty category list
    pub fn validate(&self) -> Result<(), InputError> {
        if self.priority.trim().is_empty() {
            return Err(InputError::MissingField("priority"));
        }
        if self.details.trim().is_empty() {
            return Err(InputError::MissingField("details"));
        }
        if self.categories.is_empty() {
            return Err(InputError::EmptySelection("category"));
        }
        Ok(())
    }
}

/// A facilitator observation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Observation {
    /// Creation time in epoch milliseconds
    pub id: i64,
    /// Category key
    pub category: String,
    /// Observation text
    pub text: String,
    /// Phase at creation
    pub phase: Phase,
    /// Display timestamp
    pub timestamp: String,
}

impl Observation {
    fn timeline_item(&self) -> TimelineItem {
        let category = if self.category.is_empty() { "Observation" } else { &self.category };
        TimelineItem::new(ItemType::Observation)
            .with_time(self.timestamp.clone())
            .with_timestamp(self.id)
            .with_phase(self.phase)
            .with_content(format!("{category}: {}", self.text))
            .with_team(Team::Blue)
    }
}

/// Anything the undo history can restore
#[derive(Debug, Clone, PartialEq)]
pub enum FacilitatorItem {
    /// An action
    Action(Action),
    /// An information request
    Request(InfoRequest),
    /// An observation
    Observation(Observation),
}

/// Stored Facilitator record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FacilitatorRecord {
    /// Move
    #[serde(rename = "move")]
    pub move_number: Move,
    /// Phase at save
    pub phase: Phase,
    /// Actions
    pub actions: Vec<Action>,
    /// Information requests
    pub info_requests: Vec<InfoRequest>,
    /// Observations
    pub observations: Vec<Observation>,
}

impl FacilitatorRecord {
    /// Declared shape of the stored record
    #[must_use]
    pub fn schema() -> Schema {
        Schema::new()
            .field_or("actions", FieldType::Array, json!([]))
            .field_or("infoRequests", FieldType::Array, json!([]))
            .field_or("observations", FieldType::Array, json!([]))
            .field("move", FieldType::Number)
            .field("phase", FieldType::Number)
    }

    /// Read and leniently decode the stored record of a move
    #[must_use]
    pub fn read(store: &SessionKeyStore, session: &SessionId, mv: Move) -> Option<Self> {
        let value = store.get_value(&Record::Actions.key(session, mv))?;
        let validated = Self::schema().validate(&value, Mode::Lenient).ok()?;
        Some(Self::from_validated(&validated.record, mv))
    }

    fn from_validated(record: &Map<String, Value>, mv: Move) -> Self {
        Self {
            move_number: mv,
            phase: record.get("phase").map_or_else(Phase::default, Phase::normalize),
            actions: decode_list(record.get("actions"), "action"),
            info_requests: decode_list(record.get("infoRequests"), "info request"),
            observations: decode_list(record.get("observations"), "observation"),
        }
    }

    /// Actions and observations as BLUE timeline items
    #[must_use]
    pub fn timeline_items(&self) -> Vec<TimelineItem> {
        self.actions
            .iter()
            .map(Action::timeline_item)
            .chain(self.observations.iter().map(Observation::timeline_item))
            .collect()
    }
}

/// Requests mirrored for the other roles, session key first then legacy
#[must_use]
pub fn mirrored_requests(store: &SessionKeyStore, session: &SessionId, mv: Move) -> Vec<InfoRequest> {
    let found = first_present(
        store,
        &[
            Record::BlueRequests.key(session, mv),
            legacy::blue_requests(mv),
            legacy::blue_requests_submitted(mv),
        ],
    );
    match found {
        Some((_, Value::Object(map))) => decode_list(map.get("requests"), "mirrored request"),
        Some((_, value)) => decode_list(Some(&value), "mirrored request"),
        None => Vec::new(),
    }
}

/// Submission announced to the White Cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSubmission {
    /// RFC 3339 submission time
    pub submitted_at: String,
    /// Submitting role
    pub submitted_by: String,
    /// Number of actions
    pub count: usize,
    /// Number of requests
    pub request_count: usize,
    /// Number of observations
    pub observation_count: usize,
    /// Key holding the submitted record
    pub data_ref: String,
    /// Move
    #[serde(rename = "move")]
    pub move_number: Move,
    /// Phase at submission
    pub phase: Phase,
}

/// A White Cell reply as shown to the Facilitator
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WhiteResponse {
    /// Headline
    pub summary: String,
    /// Outcome text, empty for plain communications
    pub outcomes: String,
    /// Body
    pub notes: String,
    /// Timestamp as stored
    pub timestamp: String,
}

fn text(value: &Value, field: &str) -> String {
    value.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Facilitator workspace
pub struct Facilitator {
    store: Arc<SessionKeyStore>,
    writer: TimelineWriter,
    autosave: AutoSave,
    session: SessionId,
    move_number: Move,
    phase: Phase,
    actions: Vec<Action>,
    requests: Vec<InfoRequest>,
    observations: Vec<Observation>,
    kept: Vec<(&'static str, Vec<Value>)>,
    undo: UndoStack<FacilitatorItem>,
    ids: IdSource,
    seen_responses: usize,
}

impl Facilitator {
    /// Empty workspace for a session and move
    #[must_use]
    pub fn new(store: Arc<SessionKeyStore>, session: SessionId, mv: Move, config: &WargameConfig) -> Self {
        Self {
            writer: config.timeline_writer(Arc::clone(&store)),
            autosave: AutoSave::new(Role::Facilitator, config.autosave_interval()),
            store,
            session,
            move_number: mv,
            phase: Phase::default(),
            actions: Vec::new(),
            requests: Vec::new(),
            observations: Vec::new(),
            kept: Vec::new(),
            undo: UndoStack::new(config.undo_limit),
            ids: IdSource::default(),
            seen_responses: 0,
        }
    }

    /// With export destination for auto-saves and submission copies
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ExportSink>) -> Self {
        self.autosave = self.autosave.with_sink(sink);
        self
    }

    /// Actions in order
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Requests in order
    #[must_use]
    pub fn requests(&self) -> &[InfoRequest] {
        &self.requests
    }

    /// Observations in order
    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Undo entries available
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    fn timestamp(&self) -> String {
        self.store.clock().now().to_rfc3339()
    }

    fn next_id(&mut self) -> i64 {
        let now = self.store.clock().now_ms();
        self.ids.next(now)
    }

    fn push_undo(&mut self, entry: UndoEntry<FacilitatorItem>) {
        if self.undo.push(entry) == PushOutcome::LimitReached {
            self.store.notifier().info(&undo_limit_message(self.undo.limit()));
        }
    }

    fn resequence(&mut self) {
        for (index, action) in self.actions.iter_mut().enumerate() {
            action.number = index + 1;
        }
    }

    /// Save after a mutation; failures were already reported by the store
    fn persist(&mut self) {
        if let Err(e) = self.save() {
            error!(error = %e, "failed to save facilitator data");
        }
    }

    /// Validate and append an action
    pub fn add_action(&mut self, draft: ActionDraft) -> RoleResult<Action> {
        draft.validate()?;
        let id = self.next_id();
        let timestamp = self.timestamp();
        let action = Action {
            id,
            number: self.actions.len() + 1,
            mechanism: draft.mechanism,
            sector: draft.sector,
            targets: draft.targets,
            exposure: draft.exposure,
            goal: draft.goal.trim().to_string(),
            outcomes: draft.outcomes.trim().to_string(),
            contingencies: draft.contingencies.trim().to_string(),
            phase: self.phase,
            timestamp,
        };
        self.actions.push(action.clone());
        self.persist();
        info!(id, number = action.number, "action added");
        Ok(action)
    }

    /// Replace every field of an action except its id and number
    pub fn edit_action(&mut self, id: i64, draft: ActionDraft) -> RoleResult<Action> {
        draft.validate()?;
        let index = self
            .actions
            .iter()
            .position(|a| a.id == id)
            .ok_or(InputError::NotFound { kind: "action", id })?;
        let timestamp = self.timestamp();
        let original = self.actions[index].clone();
        let updated = Action {
            mechanism: draft.mechanism,
            sector: draft.sector,
            targets: draft.targets,
            exposure: draft.exposure,
            goal: draft.goal.trim().to_string(),
            outcomes: draft.outcomes.trim().to_string(),
            contingencies: draft.contingencies.trim().to_string(),
            phase: self.phase,
            timestamp,
            ..original.clone()
        };
        self.push_undo(UndoEntry::Edited {
            original: FacilitatorItem::Action(original),
        });
        self.actions[index] = updated.clone();
        self.persist();
        self.store.notifier().info("Action updated");
        Ok(updated)
    }

    /// Remove an action and renumber the rest
    pub fn delete_action(&mut self, id: i64) -> RoleResult<Action> {
        let index = self
            .actions
            .iter()
            .position(|a| a.id == id)
            .ok_or(InputError::NotFound { kind: "action", id })?;
        let removed = self.actions.remove(index);
        self.push_undo(UndoEntry::Deleted {
            index,
            item: FacilitatorItem::Action(removed.clone()),
        });
        self.resequence();
        self.persist();
        self.store.notifier().info("Action deleted");
        Ok(removed)
    }

    /// Validate and append an information request, mirroring it for the other roles
    pub fn add_request(&mut self, draft: RequestDraft) -> RoleResult<InfoRequest> {
        draft.validate()?;
        let id = self.next_id();
        let timestamp = self.timestamp();
        let request = InfoRequest {
            id,
            priority: draft.priority,
            categories: draft.categories,
            details: draft.details.trim().to_string(),
            phase: self.phase,
            timestamp,
            status: "pending".into(),
        };
        self.requests.push(request.clone());
        self.mirror_request(&request);
        self.persist();
        Ok(request)
    }

    fn mirror_request(&self, request: &InfoRequest) {
        let key = Record::BlueRequests.key(&self.session, self.move_number);
        let mut mirrored = match self.store.get_value(&key) {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        };
        mirrored.push(json!({
            "id": request.id,
            "priority": request.priority,
            "categories": request.categories,
            "details": request.details,
            "phase": request.phase,
            "timestamp": self.store.clock().now().to_rfc3339(),
        }));
        if !self.store.set(&key, &mirrored) {
            error!(key, "failed to mirror info request");
            return;
        }
        let legacy_key = legacy::blue_requests(self.move_number);
        if !self.store.set(&legacy_key, &mirrored) {
            warn!(key = legacy_key, "could not write legacy request mirror, continuing with session key only");
        }
    }

    /// Remove a request, update the mirrors and announce the deletion
    pub fn delete_request(&mut self, id: i64) -> RoleResult<InfoRequest> {
        let index = self
            .requests
            .iter()
            .position(|r| r.id == id)
            .ok_or(InputError::NotFound { kind: "request", id })?;
        let removed = self.requests.remove(index);
        self.push_undo(UndoEntry::Deleted {
            index,
            item: FacilitatorItem::Request(removed.clone()),
        });

        let key = Record::BlueRequests.key(&self.session, self.move_number);
        let remaining: Vec<Value> = read_array(&self.store, &[key.clone()])
            .into_iter()
            .filter(|entry| entry.get("id").and_then(Value::as_i64) != Some(id))
            .collect();
        self.store.set(&key, &remaining);
        let legacy_key = legacy::blue_requests(self.move_number);
        if self.store.contains(&legacy_key) {
            self.store.set(&legacy_key, &remaining);
        }
        self.store.set(
            keys::REQUEST_DELETED,
            &json!({
                "requestId": id,
                "move": self.move_number,
                "sessionId": self.session,
                "timestamp": self.store.clock().now_ms(),
            }),
        );

        self.persist();
        self.store.notifier().info("Request deleted");
        Ok(removed)
    }

    /// Validate and append an observation
    pub fn add_observation(&mut self, category: &str, text: &str) -> RoleResult<Observation> {
        if category.trim().is_empty() {
            return Err(InputError::MissingField("category").into());
        }
        if text.trim().is_empty() {
            return Err(InputError::MissingField("text").into());
        }
        let id = self.next_id();
        let timestamp = self.timestamp();
        let observation = Observation {
            id,
            category: category.to_string(),
            text: text.trim().to_string(),
            phase: self.phase,
            timestamp,
        };
        self.observations.push(observation.clone());
        self.persist();
        Ok(observation)
    }

    /// Remove an observation
    pub fn delete_observation(&mut self, id: i64) -> RoleResult<Observation> {
        let index = self
            .observations
            .iter()
            .position(|o| o.id == id)
            .ok_or(InputError::NotFound { kind: "observation", id })?;
        let removed = self.observations.remove(index);
        self.push_undo(UndoEntry::Deleted {
            index,
            item: FacilitatorItem::Observation(removed.clone()),
        });
        self.persist();
        self.store.notifier().info("Observation deleted");
        Ok(removed)
    }

    /// Revert the most recent delete or edit
    pub fn undo(&mut self) -> Option<FacilitatorItem> {
        let Some(entry) = self.undo.pop() else {
            self.store.notifier().info(MSG_NOTHING_TO_UNDO);
            return None;
        };
        let restored = match entry {
            UndoEntry::Deleted { index, item } => {
                match &item {
                    FacilitatorItem::Action(action) => {
                        self.actions.insert(index.min(self.actions.len()), action.clone());
                        self.resequence();
                    }
                    FacilitatorItem::Request(request) => {
                        self.requests.insert(index.min(self.requests.len()), request.clone());
                        self.mirror_request(request);
                    }
                    FacilitatorItem::Observation(observation) => {
                        self.observations
                            .insert(index.min(self.observations.len()), observation.clone());
                    }
                }
                item
            }
            UndoEntry::Edited { original } => {
                match &original {
                    FacilitatorItem::Action(action) => {
                        if let Some(slot) = self.actions.iter_mut().find(|a| a.id == action.id) {
                            *slot = action.clone();
                        }
                    }
                    FacilitatorItem::Request(request) => {
                        if let Some(slot) = self.requests.iter_mut().find(|r| r.id == request.id) {
                            *slot = request.clone();
                        }
                    }
                    FacilitatorItem::Observation(observation) => {
                        if let Some(slot) = self.observations.iter_mut().find(|o| o.id == observation.id) {
                            *slot = observation.clone();
                        }
                    }
                }
                original
            }
        };
        self.persist();
        self.store.notifier().info(MSG_UNDONE);
        Some(restored)
    }

    /// Typed record as saved
    #[must_use]
    pub fn facilitator_record(&self) -> FacilitatorRecord {
        FacilitatorRecord {
            move_number: self.move_number,
            phase: self.phase,
            actions: self.actions.clone(),
            info_requests: self.requests.clone(),
            observations: self.observations.clone(),
        }
    }

    /// Validate every action and announce the submission to the White Cell
    pub async fn submit(&mut self) -> RoleResult<ActionSubmission> {
        self.save()?;
        if self.actions.is_empty() {
            return Err(InputError::NothingToSubmit.into());
        }
        let issues: Vec<ActionIssue> = self
            .actions
            .iter()
            .enumerate()
            .filter_map(|(i, action)| {
                let missing = action.missing_fields();
                (!missing.is_empty()).then_some(ActionIssue { index: i + 1, missing })
            })
            .collect();
        if !issues.is_empty() {
            return Err(InputError::InvalidActions(issues).into());
        }
        if self.phase < Phase::Finalization {
            warn!(phase = %self.phase, "actions submitted before the finalization phase");
        }

        let data_ref = Record::Actions.key(&self.session, self.move_number);
        let submission = ActionSubmission {
            submitted_at: self.store.clock().now().to_rfc3339(),
            submitted_by: "facilitator".into(),
            count: self.actions.len(),
            request_count: self.requests.len(),
            observation_count: self.observations.len(),
            data_ref,
            move_number: self.move_number,
            phase: self.phase,
        };
        self.store
            .try_set(&Record::BlueActions.key(&self.session, self.move_number), &submission)?;

        let event = TimelineItem::new(ItemType::Action)
            .with_phase(self.phase)
            .with_title(format!("Facilitator submitted {} actions", submission.count))
            .with_content(format!(
                "Actions: {}, Requests: {}, Observations: {}",
                submission.count, submission.request_count, submission.observation_count
            ))
            .with_team(Team::Blue)
            .with_refs(json!({
                "submittedBy": "facilitator",
                "actionCount": submission.count,
                "requestCount": submission.request_count,
                "observationCount": submission.observation_count,
            }));
        if let Err(e) = self.writer.append(&self.session, self.move_number, event).await {
            error!(error = %e, "failed to append submission to timeline");
        }

        self.write_submission_copy();
        info!(count = submission.count, move_number = %self.move_number, "submitted actions to white cell");
        self.store
            .notifier()
            .info(&format!("Successfully submitted {} actions to WHITE Cell", submission.count));
        Ok(submission)
    }

    fn write_submission_copy(&self) {
        let Some(sink) = self.autosave.sink() else {
            return;
        };
        let record = self.record();
        let filename = Role::Facilitator.submission_filename(self.move_number, self.store.clock().now());
        let written = serde_json::to_string_pretty(&record)
            .map_err(RoleError::from)
            .and_then(|text| sink.write(&filename, &text).map_err(RoleError::from));
        if let Err(e) = written {
            warn!(filename, error = %e, "could not write submission copy");
        }
        if let Err(e) = self
            .autosave
            .export_now(&self.store, &self.session, self.move_number, &record)
        {
            warn!(error = %e, "auto-save after submission failed");
        }
    }

    /// Export every move of the session; returns the filename written
    pub fn export(&mut self, sink: &dyn ExportSink) -> RoleResult<String> {
        self.save()?;
        let mut all_moves = Map::new();
        let mut all_requests = Map::new();
        for mv in Move::all() {
            if let Some(record) = self.store.get_value(&Record::Actions.key(&self.session, mv)) {
                all_moves.insert(mv.to_string(), record);
            }
            let requests = read_array(&self.store, &[Record::BlueRequests.key(&self.session, mv)]);
            if !requests.is_empty() {
                all_requests.insert(mv.to_string(), Value::Array(requests));
            }
        }
        if all_moves.is_empty() && all_requests.is_empty() {
            return Err(InputError::NothingToExport.into());
        }

        let now = self.store.clock().now();
        let document = json!({
            "exported": now.to_rfc3339(),
            "exportedBy": Role::Facilitator.exporter(),
            "sessionId": self.session,
            "allMoves": all_moves,
            "allRequests": all_requests,
            "timelineItems": blue_items_all_moves(&self.store, &self.session),
            "currentMove": self.move_number,
            "currentPhase": self.phase,
            "metadata": {
                "exportVersion": "1.0",
                "includesRequests": true,
                "includesTimeline": true,
            },
        });
        let filename = export_filename(Role::Facilitator.export_prefix(), &self.session, now);
        sink.write(&filename, &serde_json::to_string_pretty(&document)?)?;
        self.store.notifier().info(MSG_EXPORTED);
        Ok(filename)
    }

    /// White Cell communications and feedback for this move, oldest first
    #[must_use]
    pub fn white_responses(&self) -> Vec<WhiteResponse> {
        let communications = read_array(
            &self.store,
            &[
                Record::Communications.key(&self.session, self.move_number),
                legacy::communications(self.move_number),
            ],
        );
        let feedback = read_array(
            &self.store,
            &[Record::WhiteCellFeedback.key(&self.session, self.move_number)],
        );
        let mut responses: Vec<WhiteResponse> = feedback
            .iter()
            .map(|f| WhiteResponse {
                summary: text(f, "summary"),
                outcomes: text(f, "outcomes"),
                notes: text(f, "notes"),
                timestamp: text(f, "timestamp"),
            })
            .chain(communications.iter().map(|c| WhiteResponse {
                summary: text(c, "title"),
                outcomes: String::new(),
                notes: text(c, "content"),
                timestamp: text(c, "timestamp"),
            }))
            .collect();
        responses.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        responses
    }

    /// Re-read responses; returns how many arrived since the last poll
    pub fn poll_white_responses(&mut self) -> usize {
        let current = self.white_responses().len();
        let previous = self.seen_responses;
        let fresh = current.saturating_sub(previous);
        if fresh > 0 && previous != 0 {
            self.store
                .notifier()
                .info(&format!("New WHITE Cell responses: +{fresh}"));
        }
        self.seen_responses = current;
        fresh
    }
}

impl Workspace for Facilitator {
    fn role(&self) -> Role {
        Role::Facilitator
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
            .try_set(&Record::Actions.key(&self.session, self.move_number), &record)?;
        self.autosave
            .maybe_export(&self.store, &self.session, self.move_number, &record);
        Ok(())
    }

    fn load(&mut self, mode: Mode) -> RoleResult<bool> {
        self.actions.clear();
        self.requests.clear();
        self.observations.clear();
        self.kept.clear();
        self.undo.clear();
        self.seen_responses = 0;

        let Some((key, stored)) = first_present(
            &self.store,
            &[
                Record::Actions.key(&self.session, self.move_number),
                legacy::blue_facilitator(self.move_number),
            ],
        ) else {
            return Ok(false);
        };
        let validated = match FacilitatorRecord::schema().validate(&stored, mode) {
            Ok(validated) => validated,
            Err(e) => {
                warn!(key, error = %e, "stored facilitator record refused");
                self.store.notifier().warning(MSG_VALIDATION_FAILED);
                return Err(e.into());
            }
        };
        if !validated.is_clean() {
            self.store.notifier().warning(MSG_VALIDATION_FAILED);
        }
        let (actions, kept_actions) = split_list(validated.record.get("actions"), "action");
        let (requests, kept_requests) = split_list(validated.record.get("infoRequests"), "info request");
        let (observations, kept_observations) =
            split_list(validated.record.get("observations"), "observation");
        self.actions = actions;
        self.requests = requests;
        self.observations = observations;
        self.kept = [
            ("actions", kept_actions),
            ("infoRequests", kept_requests),
            ("observations", kept_observations),
        ]
        .into_iter()
        .filter(|(_, entries)| !entries.is_empty())
        .collect();
        for id in self
            .actions
            .iter()
            .map(|a| a.id)
            .chain(self.requests.iter().map(|r| r.id))
            .chain(self.observations.iter().map(|o| o.id))
        {
            self.ids.observe(id);
        }
        info!(
            key,
            actions = self.actions.len(),
            requests = self.requests.len(),
            observations = self.observations.len(),
            "loaded facilitator data"
        );
        Ok(true)
    }

    fn record(&self) -> Value {
        let mut record = serde_json::to_value(self.facilitator_record()).unwrap_or(Value::Null);
        for (field, entries) in &self.kept {
            append_kept(&mut record, field, entries);
        }
        record
    }

    fn timeline(&self) -> Vec<TimelineItem> {
        let feed = Feed::new(&self.store, self.session.clone(), self.move_number);
        aggregate([
            feed.white_cell_items(Some(Team::Blue)),
            feed.notes_items(),
            self.facilitator_record().timeline_items(),
        ])
    }

    fn poll_updates(&mut self) -> usize {
        self.poll_white_responses()
    }

    fn rebind(&mut self, session: SessionId) {
        self.session = session;
        self.seen_responses = 0;
    }

    fn retarget(&mut self, mv: Move) {
        self.move_number = mv;
    }
}

impl std::fmt::Debug for Facilitator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Facilitator")
            .field("session", &self.session)
            .field("move_number", &self.move_number)
            .field("phase", &self.phase)
            .field("actions", &self.actions.len())
            .field("requests", &self.requests.len())
            .field("observations", &self.observations.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wargame_store::{ManualClock, MemoryBackend, MemorySink, RecordingNotifier, StorageBackend};

    struct Fixture {
        backend: Arc<MemoryBackend>,
        notifier: Arc<RecordingNotifier>,
        facilitator: Facilitator,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let store = SessionKeyStore::new(backend.clone())
            .with_notifier(notifier.clone())
            .with_clock(Arc::new(ManualClock::at(1_700_000_000_000)));
        let facilitator = Facilitator::new(
            Arc::new(store),
            SessionId::new("ex"),
            Move::FIRST,
            &WargameConfig::default(),
        );
        Fixture {
            backend,
            notifier,
            facilitator,
        }
    }

    fn draft(goal: &str) -> ActionDraft {
        ActionDraft {
            mechanism: "export".into(),
            sector: "telecommunications".into(),
            targets: vec!["prc".into()],
            exposure: "high".into(),
            goal: goal.into(),
            outcomes: "slowdown".into(),
            contingencies: "escalate".into(),
        }
    }

    fn stored(backend: &MemoryBackend, key: &str) -> Value {
        serde_json::from_str(&backend.get(key).unwrap()).unwrap()
    }

    #[test]
    fn invalid_action_writes_nothing() {
        let mut fx = fixture();
        let err = fx.facilitator.add_action(draft("  ")).unwrap_err();
        assert!(matches!(err, RoleError::Input(InputError::MissingField("goal"))));
        let mut no_targets = draft("goal");
        no_targets.targets.clear();
        assert!(fx.facilitator.add_action(no_targets).is_err());
        assert!(fx.backend.keys().is_empty());
    }

    #[test]
    fn delete_then_undo_restores_list() {
        let mut fx = fixture();
        let a = fx.facilitator.add_action(draft("A")).unwrap();
        let b = fx.facilitator.add_action(draft("B")).unwrap();
        fx.facilitator.delete_action(b.id).unwrap();
        assert_eq!(fx.facilitator.actions().len(), 1);

        fx.facilitator.undo().unwrap();
        assert_eq!(fx.facilitator.actions(), &[a, b][..]);
        let saved = stored(&fx.backend, "actions_session_ex_move_1");
        assert_eq!(saved["actions"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn deleting_renumbers_and_undo_restores_position() {
        let mut fx = fixture();
        let a = fx.facilitator.add_action(draft("A")).unwrap();
        let b = fx.facilitator.add_action(draft("B")).unwrap();
        let c = fx.facilitator.add_action(draft("C")).unwrap();
        fx.facilitator.delete_action(a.id).unwrap();
        let numbers: Vec<_> = fx.facilitator.actions().iter().map(|x| (x.id, x.number)).collect();
        assert_eq!(numbers, vec![(b.id, 1), (c.id, 2)]);

        fx.facilitator.undo();
        let order: Vec<_> = fx.facilitator.actions().iter().map(|x| x.goal.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert_eq!(fx.facilitator.actions()[2].number, 3);
    }

    #[test]
    fn edit_keeps_id_and_undo_restores_original() {
        let mut fx = fixture();
        let a = fx.facilitator.add_action(draft("A")).unwrap();
        let edited = fx.facilitator.edit_action(a.id, draft("A2")).unwrap();
        assert_eq!(edited.id, a.id);
        assert_eq!(edited.number, 1);
        assert_eq!(fx.facilitator.actions()[0].goal, "A2");
        fx.facilitator.undo();
        assert_eq!(fx.facilitator.actions()[0], a);
    }

    #[test]
    fn undo_on_empty_history_notifies() {
        let mut fx = fixture();
        assert!(fx.facilitator.undo().is_none());
        assert_eq!(fx.notifier.messages(), vec![MSG_NOTHING_TO_UNDO.to_string()]);
    }

    #[test]
    fn requests_are_mirrored_and_deletion_announced() {
        let mut fx = fixture();
        let request = fx
            .facilitator
            .add_request(RequestDraft {
                priority: "high".into(),
                categories: vec!["economic".into()],
                details: "Chip output?".into(),
            })
            .unwrap();
        assert_eq!(stored(&fx.backend, "blueRequests_session_ex_move_1")[0]["details"], "Chip output?");
        assert_eq!(stored(&fx.backend, "blueRequests_move_1").as_array().unwrap().len(), 1);

        fx.facilitator.delete_request(request.id).unwrap();
        assert_eq!(stored(&fx.backend, "blueRequests_session_ex_move_1"), json!([]));
        assert_eq!(stored(&fx.backend, "blueRequests_move_1"), json!([]));
        let marker = stored(&fx.backend, "_requestDeleted");
        assert_eq!(marker["requestId"], json!(request.id));
        assert_eq!(marker["sessionId"], json!("ex"));
    }

    #[test]
    fn unreadable_entries_survive_a_save() {
        let mut fx = fixture();
        fx.backend
            .set(
                "actions_session_ex_move_1",
                r#"{"actions":[{"id":5,"number":1,"goal":"old"},"scribble"],"observations":[7]}"#,
            )
            .unwrap();
        assert!(fx.facilitator.load(Mode::Lenient).unwrap());
        assert_eq!(fx.facilitator.actions().len(), 1);
        fx.facilitator.add_action(draft("new")).unwrap();

        let saved = stored(&fx.backend, "actions_session_ex_move_1");
        let actions = saved["actions"].as_array().unwrap();
        assert_eq!(actions.len(), 3);
        assert!(actions.contains(&json!("scribble")));
        assert_eq!(saved["observations"], json!([7]));
    }

    #[test]
    fn load_falls_back_to_legacy_record() {
        let mut fx = fixture();
        fx.backend
            .set(
                "blueFacilitatorMove1",
                r#"{"actions":[{"id":5,"number":1,"goal":"old"}],"observations":"bad"}"#,
            )
            .unwrap();
        assert!(fx.facilitator.load(Mode::Lenient).unwrap());
        assert_eq!(fx.facilitator.actions()[0].goal, "old");
        assert!(fx.facilitator.observations().is_empty());
        assert_eq!(fx.notifier.messages(), vec![MSG_VALIDATION_FAILED.to_string()]);
    }

    #[test]
    fn strict_load_refuses_mistyped_record() {
        let mut fx = fixture();
        fx.backend
            .set("actions_session_ex_move_1", r#"{"actions":"nope"}"#)
            .unwrap();
        assert!(matches!(
            fx.facilitator.load(Mode::Strict),
            Err(RoleError::Schema(_))
        ));
        assert!(fx.facilitator.actions().is_empty());
    }

    #[tokio::test]
    async fn submit_writes_flag_and_timeline_event() {
        let mut fx = fixture();
        fx.facilitator.set_phase(Phase::Finalization);
        fx.facilitator.add_action(draft("A")).unwrap();
        fx.facilitator.add_observation("team", "Quiet deputy").unwrap();
        let submission = fx.facilitator.submit().await.unwrap();
        assert_eq!(submission.count, 1);
        assert_eq!(submission.observation_count, 1);

        let flag = stored(&fx.backend, "blueActions_session_ex_move_1");
        assert_eq!(flag["submittedBy"], "facilitator");
        assert_eq!(flag["dataRef"], "actions_session_ex_move_1");
        let shared = stored(&fx.backend, "whiteCell_session_ex_move_1");
        let event = &shared["timelineItems"][0];
        assert_eq!(event["title"], "Facilitator submitted 1 actions");
        assert_eq!(event["refs"]["observationCount"], 1);
    }

    #[tokio::test]
    async fn submit_rejects_incomplete_stored_actions() {
        let mut fx = fixture();
        fx.backend
            .set(
                "actions_session_ex_move_1",
                r#"{"actions":[{"id":1,"number":1,"mechanism":"trade","targets":[]}]}"#,
            )
            .unwrap();
        fx.facilitator.load(Mode::Lenient).unwrap();
        let err = fx.facilitator.submit().await.unwrap_err();
        let RoleError::Input(InputError::InvalidActions(issues)) = err else {
            panic!("expected invalid actions");
        };
        assert_eq!(issues[0].index, 1);
        assert!(issues[0].missing.contains(&"targets"));
        assert!(fx.backend.get("blueActions_session_ex_move_1").is_none());
    }

    #[tokio::test]
    async fn submit_with_no_actions_is_rejected() {
        let mut fx = fixture();
        assert!(matches!(
            fx.facilitator.submit().await,
            Err(RoleError::Input(InputError::NothingToSubmit))
        ));
    }

    #[test]
    fn export_collects_every_move() {
        let mut fx = fixture();
        fx.facilitator.add_action(draft("A")).unwrap();
        let sink = MemorySink::new();
        let filename = fx.facilitator.export(&sink).unwrap();
        assert!(filename.starts_with("BLUE_Facilitator_Session_ex_"));
        let (_, text) = &sink.files()[0];
        let doc: Value = serde_json::from_str(text).unwrap();
        assert_eq!(doc["exportedBy"], "BLUE Team Facilitator");
        assert_eq!(doc["allMoves"]["1"]["actions"][0]["goal"], "A");
        assert_eq!(doc["metadata"]["exportVersion"], "1.0");
    }

    #[test]
    fn white_responses_merge_and_count_new_ones() {
        let mut fx = fixture();
        fx.backend
            .set(
                "communications_session_ex_move_1",
                r#"[{"title":"Ruling","content":"Granted","timestamp":"2025-01-01T10:00:00Z"}]"#,
            )
            .unwrap();
        fx.backend
            .set(
                "whiteCellFeedback_session_ex_move_1",
                r#"[{"summary":"Outcome","outcomes":"Win","notes":"n","timestamp":"2025-01-01T09:00:00Z"}]"#,
            )
            .unwrap();
        let responses = fx.facilitator.white_responses();
        assert_eq!(responses[0].summary, "Outcome");
        assert_eq!(responses[1].notes, "Granted");

        assert_eq!(fx.facilitator.poll_white_responses(), 2);
        fx.backend
            .set(
                "communications_session_ex_move_1",
                r#"[{"title":"a","timestamp":"1"},{"title":"b","timestamp":"2"}]"#,
            )
            .unwrap();
        assert_eq!(fx.facilitator.poll_white_responses(), 1);
        assert_eq!(
            fx.notifier.messages(),
            vec!["New WHITE Cell responses: +1".to_string()]
        );
    }

    #[test]
    fn timeline_projects_actions_and_observations() {
        let mut fx = fixture();
        fx.facilitator.add_action(draft("Cut chips")).unwrap();
        fx.facilitator.add_observation("", "x").unwrap_err();
        fx.facilitator.add_observation("risk", "Exposure").unwrap();
        let items = fx.facilitator.timeline();
        assert_eq!(items.len(), 2);
        assert!(items
            .iter()
            .any(|i| i.content.as_deref() == Some("Action 1: Cut chips")));
        assert!(items.iter().any(|i| i.content.as_deref() == Some("risk: Exposure")));
    }
}
