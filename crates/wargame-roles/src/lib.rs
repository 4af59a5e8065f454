//! Wargame Role Workspaces
//!
//! The three role pages of a tabletop wargame move: the BLUE Facilitator,
//! the BLUE Notetaker and the White Cell (game control). Each keeps a
//! per-session, per-move workspace in the shared key store and feeds the
//! merged timeline.
//!
//! # Core Concepts
//!
//! - [`Workspace`]: save/load/timeline contract shared by every role
//! - [`Facilitator`]: actions, information requests, observations, undo, submission
//! - [`Notetaker`]: captures, analysis fields, submission, reports
//! - [`WhiteCell`]: move/phase control, timer, rulings, adjudication, responses
//! - [`RolePage`]: page lifecycle (resolve, migrate, load, poll, final save)
//! - [`Schema`]: lenient or strict validation of stored records
//! - [`FallbackStore`]: optional remote persistence that never fails the caller
//! - [`WargameConfig`]: TOML configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use wargame_roles::{Facilitator, PageOptions, RolePage, WargameConfig};
//! use wargame_store::Move;
//! use std::sync::Arc;
//!
//! let config = WargameConfig::load("wargame.toml")?;
//! let store = Arc::new(config.open_store()?);
//! let page = RolePage::open(store, &config, PageOptions::default(), |store, session| {
//!     Facilitator::new(store, session, Move::FIRST, &config)
//! })?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod autosave;
mod config;
mod error;
mod facilitator;
mod notetaker;
mod page;
mod remote;
mod role;
mod schema;
mod undo;
mod white_cell;
mod workspace;

// Re-exports
pub use autosave::AutoSave;
pub use config::{AppendPolicy, PollIntervals, WargameConfig};
pub use error::{ActionIssue, InputError, RemoteError, RoleError, RoleResult, SchemaError};
pub use facilitator::{
    mirrored_requests, undo_limit_message, Action, ActionDraft, ActionSubmission, Facilitator,
    FacilitatorItem, FacilitatorRecord, InfoRequest, Observation, RequestDraft, WhiteResponse,
    MSG_NOTHING_TO_UNDO, MSG_UNDONE,
};
pub use notetaker::{
    alliance_report, faction_analysis, team_dynamics_report, AnalysisSection, CaptureDraft,
    CaptureKind, CaptureTemplate, NotesSubmission, Notetaker, MSG_NOTES_EXPORTED,
    MSG_NOTES_SUBMITTED,
};
pub use page::{PageOptions, RolePage};
pub use remote::{Condition, Document, FallbackStore, MemoryRemote, Operator, RemoteStore};
pub use role::Role;
pub use schema::{FieldSpec, FieldType, Mode, Schema, Validated};
pub use undo::{PushOutcome, UndoEntry, UndoStack, DEFAULT_UNDO_LIMIT};
pub use white_cell::{
    Adjudication, AdjudicationDraft, Communication, FactionTag, Finalization, Interdependency,
    ResponseDraft, Ruling, RulingDraft, StructuralImpact, WhiteCell, MSG_ADJUDICATION_SAVED,
    MSG_RESPONSE_SENT, RULING_SUMMARY_CHARS,
};
pub use workspace::{Workspace, MSG_EXPORTED, MSG_VALIDATION_FAILED};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
