//! Error types for role workspaces
//!
//! Provides error handling for:
//! - Form input rejected before any write
//! - Stored records failing their declared schema
//! - Remote persistence failures (always downgraded by the fallback store)
//! - Configuration loading

use std::fmt;
use std::path::PathBuf;
use wargame_channel::ChannelError;
use wargame_store::StoreError;
use wargame_timeline::TimelineError;

/// Main role error type
#[derive(Debug, thiserror::Error)]
pub enum RoleError {
    /// User input rejected
    #[error("invalid input: {0}")]
    Input(#[from] InputError),

    /// Stored record refused by its schema
    #[error("schema validation failed: {0}")]
    Schema(#[from] SchemaError),

    /// Storage failure
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Timeline append failure
    #[error("timeline error: {0}")]
    Timeline(#[from] TimelineError),

    /// Shared channel failure
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Export document could not be encoded
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Configuration could not be read or parsed
    #[error("configuration error in {}: {message}", .path.display())]
    Config {
        /// Config file
        path: PathBuf,
        /// Reason
        message: String,
    },
}

impl RoleError {
    /// Create configuration error
    #[inline]
    #[must_use]
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the user can fix this by correcting the form
    #[inline]
    #[must_use]
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }
}

/// Result alias for role operations
pub type RoleResult<T> = Result<T, RoleError>;

/// Form input problems; nothing is written when one is returned
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// Required text field empty
    #[error("required field '{0}' is empty")]
    MissingField(&'static str),

    /// Required selection empty
    #[error("select at least one {0}")]
    EmptySelection(&'static str),

    /// No item with that id
    #[error("{kind} {id} not found")]
    NotFound {
        /// Item kind
        kind: &'static str,
        /// Requested id
        id: i64,
    },

    /// Submission with nothing in it
    #[error("nothing to submit")]
    NothingToSubmit,

    /// Export with no stored data
    #[error("no data to export")]
    NothingToExport,

    /// Stored actions are incomplete
    #[error("actions have missing required fields:{}", format_issues(.0))]
    InvalidActions(Vec<ActionIssue>),
}

/// Missing fields of one stored action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionIssue {
    /// 1-based position
    pub index: usize,
    /// Fields that are missing or blank
    pub missing: Vec<&'static str>,
}

impl fmt::Display for ActionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action {}: Missing {}", self.index, self.missing.join(", "))
    }
}

fn format_issues(issues: &[ActionIssue]) -> String {
    issues.iter().map(|issue| format!(" {issue};")).collect()
}

/// Schema validation failures (strict mode only)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Record is not a JSON object
    #[error("record is not an object")]
    NotAnObject,

    /// Required field absent
    #[error("required field '{0}' missing")]
    MissingField(String),

    /// Field present with the wrong type
    #[error("field '{field}' expected {expected}, got {actual}")]
    TypeMismatch {
        /// Field name
        field: String,
        /// Declared type
        expected: &'static str,
        /// Stored type
        actual: &'static str,
    },
}

/// Remote persistence failures
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Service could not be reached
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// Document absent
    #[error("{collection}/{id} not found")]
    NotFound {
        /// Collection
        collection: String,
        /// Document id
        id: String,
    },

    /// Document could not be encoded
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_actions_lists_every_issue() {
        let err = InputError::InvalidActions(vec![
            ActionIssue {
                index: 1,
                missing: vec!["goal", "targets"],
            },
            ActionIssue {
                index: 3,
                missing: vec!["sector"],
            },
        ]);
        let text = err.to_string();
        assert!(text.contains("Action 1: Missing goal, targets"));
        assert!(text.contains("Action 3: Missing sector"));
    }

    #[test]
    fn input_errors_convert() {
        let err: RoleError = InputError::MissingField("goal").into();
        assert!(err.is_input());
        assert!(!RoleError::config("wargame.toml", "bad").is_input());
    }
}
