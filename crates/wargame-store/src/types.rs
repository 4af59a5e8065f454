//! Game clock vocabulary: moves and phases
//!
//! A game runs three moves, each cycling through five phases. Phase values
//! written by older pages may be numbers, numeric strings, or display names,
//! so deserialization accepts all three and normalizes to the number.

use crate::error::ValueError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Move number (1..=3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Move(u8);

impl Move {
    /// First move of a game
    pub const FIRST: Move = Move(1);
    /// Last move of a game
    pub const LAST: Move = Move(3);

    /// Create a move, rejecting numbers outside 1..=3
    pub fn new(number: i64) -> Result<Self, ValueError> {
        match number {
            1..=3 => Ok(Self(u8::try_from(number).map_err(|_| ValueError::MoveOutOfRange(number))?)),
            _ => Err(ValueError::MoveOutOfRange(number)),
        }
    }

    /// Move number
    #[inline]
    #[must_use]
    pub fn number(self) -> u8 {
        self.0
    }

    /// All moves in order
    pub fn all() -> impl Iterator<Item = Move> {
        (1..=3).map(Move)
    }

    /// Following move, if any
    #[must_use]
    pub fn next(self) -> Option<Move> {
        (self.0 < 3).then(|| Move(self.0 + 1))
    }

    /// Preceding move, if any
    #[must_use]
    pub fn previous(self) -> Option<Move> {
        (self.0 > 1).then(|| Move(self.0 - 1))
    }
}

impl Default for Move {
    fn default() -> Self {
        Self::FIRST
    }
}

impl TryFrom<i64> for Move {
    type Error = ValueError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Move> for u8 {
    fn from(value: Move) -> Self {
        value.0
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phase within a move
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "PhaseRepr", into = "u8")]
pub enum Phase {
    /// Team deliberates internally
    #[default]
    InternalDeliberation = 1,
    /// Team consults allies
    AllianceConsultation = 2,
    /// Team finalizes its actions
    Finalization = 3,
    /// White Cell adjudicates
    Adjudication = 4,
    /// Outcomes are briefed back
    ResultsBrief = 5,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PhaseRepr {
    Number(i64),
    Text(String),
}

impl TryFrom<PhaseRepr> for Phase {
    type Error = ValueError;

    fn try_from(value: PhaseRepr) -> Result<Self, Self::Error> {
        match value {
            PhaseRepr::Number(n) => Self::from_number(n),
            PhaseRepr::Text(text) => text.parse(),
        }
    }
}

impl Phase {
    /// All phases in order
    pub const ALL: [Phase; 5] = [
        Phase::InternalDeliberation,
        Phase::AllianceConsultation,
        Phase::Finalization,
        Phase::Adjudication,
        Phase::ResultsBrief,
    ];

    /// Phase from its number
    pub fn from_number(number: i64) -> Result<Self, ValueError> {
        Self::ALL
            .iter()
            .copied()
            .find(|phase| i64::from(phase.number()) == number)
            .ok_or_else(|| ValueError::UnknownPhase(number.to_string()))
    }

    /// Phase number (1..=5)
    #[inline]
    #[must_use]
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Display name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::InternalDeliberation => "Internal Deliberation",
            Self::AllianceConsultation => "Alliance Consultation",
            Self::Finalization => "Finalization",
            Self::Adjudication => "Adjudication",
            Self::ResultsBrief => "Results Brief",
        }
    }

    /// Normalize an arbitrary stored phase value, falling back to the first phase
    #[must_use]
    pub fn normalize(value: &Value) -> Phase {
        match value {
            Value::Number(n) => n.as_i64().and_then(|n| Self::from_number(n).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .unwrap_or_default()
    }
}

impl FromStr for Phase {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Self::from_number(n);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|phase| phase.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ValueError::UnknownPhase(s.to_string()))
    }
}

impl From<Phase> for u8 {
    fn from(value: Phase) -> Self {
        value.number()
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
