//! The three role pages

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use wargame_store::keys::Record;
use wargame_store::Move;

/// A role page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// BLUE team facilitator: actions, requests, observations
    Facilitator,
    /// BLUE team notetaker: captures and analysis
    Notetaker,
    /// Game control: clock, rulings, adjudication
    WhiteCell,
}

impl Role {
    /// Every role
    pub const ALL: [Role; 3] = [Role::Facilitator, Role::Notetaker, Role::WhiteCell];

    /// Lowercase name used in marker keys
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Facilitator => "facilitator",
            Self::Notetaker => "notetaker",
            Self::WhiteCell => "whitecell",
        }
    }

    /// Record family holding the workspace
    #[must_use]
    pub fn record(self) -> Record {
        match self {
            Self::Facilitator => Record::Actions,
            Self::Notetaker => Record::Notes,
            Self::WhiteCell => Record::WhiteCell,
        }
    }

    /// Export filename prefix
    #[must_use]
    pub fn export_prefix(self) -> &'static str {
        match self {
            Self::Facilitator => "BLUE_Facilitator",
            Self::Notetaker => "BLUE_notetaker",
            Self::WhiteCell => "WHITE_Cell",
        }
    }

    /// Identity written into exports
    #[must_use]
    pub fn exporter(self) -> &'static str {
        match self {
            Self::Facilitator => "BLUE Team Facilitator",
            Self::Notetaker => "BLUE Team Notetaker",
            Self::WhiteCell => "WHITE Cell Control",
        }
    }

    /// Only the White Cell owns the game clock and timer
    #[must_use]
    pub fn controls_game(self) -> bool {
        matches!(self, Self::WhiteCell)
    }

    /// File written alongside a submission or finalization
    #[must_use]
    pub fn submission_filename(self, mv: Move, at: DateTime<Utc>) -> String {
        let day = at.format("%Y-%m-%d");
        match self {
            Self::Facilitator => format!("BLUE_To_WHITE_Move{mv}_{day}.json"),
            Self::Notetaker => format!("BLUE_Move{mv}_Submitted_{day}.json"),
            Self::WhiteCell => format!("WHITE_Cell_Move{mv}_Finalized_{day}.json"),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "facilitator" => Ok(Self::Facilitator),
            "notetaker" => Ok(Self::Notetaker),
            "whitecell" | "white" => Ok(Self::WhiteCell),
            other => Err(format!("unknown role: {other}")),
        }
    }
}
