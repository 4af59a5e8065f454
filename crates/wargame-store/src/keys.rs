//! Storage key layout
//!
//! Every per-move record lives under `<prefix>_session_<S>_move_<M>`; the
//! two shared channels live under `<prefix>_session_<S>`. Legacy pages wrote
//! unscoped keys, which [`legacy`] names for migration and cleanup.

use crate::session::SessionId;
use crate::types::Move;

/// Persisted default session (raw string)
pub const CURRENT_SESSION_ID: &str = "currentSessionId";
/// Broadcast marker written after each timeline append
pub const TIMELINE_UPDATE: &str = "_timelineUpdate";
/// Broadcast marker written after an info request is deleted
pub const REQUEST_DELETED: &str = "_requestDeleted";

const SESSION_INFIX: &str = "_session_";

/// Per-move record families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Record {
    /// White Cell workspace, carries the shared `timelineItems`
    WhiteCell,
    /// Notetaker workspace
    Notes,
    /// Facilitator workspace
    Actions,
    /// Facilitator submission to the White Cell
    BlueActions,
    /// Facilitator information requests
    BlueRequests,
    /// Notetaker submission marker
    NotesSubmission,
    /// White Cell rulings
    WhiteCellRulings,
    /// White Cell feedback to BLUE
    WhiteCellFeedback,
    /// White Cell communications to BLUE
    Communications,
    /// White Cell adjudications
    Adjudications,
}

impl Record {
    /// Every record family
    pub const ALL: [Record; 10] = [
        Record::WhiteCell,
        Record::Notes,
        Record::Actions,
        Record::BlueActions,
        Record::BlueRequests,
        Record::NotesSubmission,
        Record::WhiteCellRulings,
        Record::WhiteCellFeedback,
        Record::Communications,
        Record::Adjudications,
    ];

    /// Key prefix
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::WhiteCell => "whiteCell",
            Self::Notes => "notes",
            Self::Actions => "actions",
            Self::BlueActions => "blueActions",
            Self::BlueRequests => "blueRequests",
            Self::NotesSubmission => "blueNotesSubmission",
            Self::WhiteCellRulings => "whiteCellRulings",
            Self::WhiteCellFeedback => "whiteCellFeedback",
            Self::Communications => "communications",
            Self::Adjudications => "adjudications",
        }
    }

    /// Session and move scoped key
    #[must_use]
    pub fn key(self, session: &SessionId, mv: Move) -> String {
        format!("{}{SESSION_INFIX}{session}_move_{mv}", self.prefix())
    }
}

/// Shared game-state channel key
#[must_use]
pub fn shared_game_state(session: &SessionId) -> String {
    format!("sharedGameState{SESSION_INFIX}{session}")
}

/// Shared timer channel key
#[must_use]
pub fn shared_timer(session: &SessionId) -> String {
    format!("sharedTimer{SESSION_INFIX}{session}")
}

/// White Cell finalization marker for a move
#[must_use]
pub fn white_cell_finalized(session: &SessionId, mv: Move) -> String {
    format!("{}_finalized", Record::WhiteCell.key(session, mv))
}

/// Migration marker
#[must_use]
pub fn migration_marker(session: &SessionId) -> String {
    format!("data_migrated{SESSION_INFIX}{session}")
}

/// In-store migration backup
#[must_use]
pub fn migration_backup(session: &SessionId, epoch_ms: i64) -> String {
    format!("migration_backup_{session}_{epoch_ms}")
}

/// Auto-save throttle marker for a role
#[must_use]
pub fn last_auto_save(role: &str, session: &SessionId, mv: Move) -> String {
    format!("lastAutoSave_{role}_{session}_{mv}")
}

/// Whether the key holds any session's namespaced data
#[must_use]
pub fn is_session_scoped(key: &str) -> bool {
    key.contains(SESSION_INFIX)
}

/// Split a scoped key into its record prefix and session id
///
/// Accepts `<prefix>_session_<S>`, `<prefix>_session_<S>_move_<M>` and
/// suffixed per-move keys such as `..._move_<M>_finalized`. The last
/// `_move_<digits>` marks the end of the session id, so ids containing `_`
/// are recovered whole.
#[must_use]
pub fn split_scoped(key: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = key.split_once(SESSION_INFIX)?;
    let session = rest
        .rmatch_indices("_move_")
        .find(|(at, marker)| {
            let digits = rest[at + marker.len()..].split('_').next().unwrap_or("");
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        })
        .map_or(rest, |(at, _)| &rest[..at]);
    Some((prefix, session))
}

/// Whether a session-scoped key belongs to `session`
#[must_use]
pub fn belongs_to(key: &str, session: &SessionId) -> bool {
    split_scoped(key).is_some_and(|(_, owner)| owner == session.as_str())
}

/// Unscoped keys written by pre-session pages
pub mod legacy {
    use crate::types::Move;
    use once_cell::sync::Lazy;
    use regex::Regex;

    /// Facilitator info requests
    #[must_use]
    pub fn blue_requests(mv: Move) -> String {
        format!("blueRequests_move_{mv}")
    }

    /// Facilitator action submissions
    #[must_use]
    pub fn blue_actions(mv: Move) -> String {
        format!("blueActions_move_{mv}")
    }

    /// White Cell adjudications
    #[must_use]
    pub fn adjudications(mv: Move) -> String {
        format!("adjudications_move_{mv}")
    }

    /// White Cell workspace
    #[must_use]
    pub fn white_cell(mv: Move) -> String {
        format!("whiteCell_move_{mv}")
    }

    /// White Cell communications
    #[must_use]
    pub fn communications(mv: Move) -> String {
        format!("communications_move_{mv}")
    }

    /// White Cell rulings
    #[must_use]
    pub fn white_cell_rulings(mv: Move) -> String {
        format!("whiteCellRulings_move_{mv}")
    }

    /// Shared BLUE workspace of the old single-page tool
    #[must_use]
    pub fn blue_facilitator(mv: Move) -> String {
        format!("blueFacilitatorMove{mv}")
    }

    /// Old submitted-actions key
    #[must_use]
    pub fn blue_actions_submitted(mv: Move) -> String {
        format!("blueActionsSubmittedMove{mv}")
    }

    /// Old submitted-requests key
    #[must_use]
    pub fn blue_requests_submitted(mv: Move) -> String {
        format!("blueRequestsSubmittedMove{mv}")
    }

    static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
        [
            r"^blueRequests_move_\d+$",
            r"^blueActions_move_\d+$",
            r"^communications_move_\d+$",
            r"^whiteCell_move_\d+$",
            r"^blueFacilitatorMove\d+$",
            r"^blueActionsSubmittedMove\d+$",
            r"^blueRequestsSubmittedMove\d+$",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    });

    /// Whether a key is one of the removable legacy keys
    #[must_use]
    pub fn is_legacy(key: &str) -> bool {
        PATTERNS.iter().any(|pattern| pattern.is_match(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(id: &str) -> SessionId {
        SessionId::new(id)
    }

    #[test]
    fn layout() {
        let m2 = Move::new(2).unwrap();
        assert_eq!(Record::WhiteCell.key(&s("abc"), m2), "whiteCell_session_abc_move_2");
        assert_eq!(Record::NotesSubmission.key(&s("abc"), m2), "blueNotesSubmission_session_abc_move_2");
        assert_eq!(shared_game_state(&s("abc")), "sharedGameState_session_abc");
        assert_eq!(white_cell_finalized(&s("abc"), m2), "whiteCell_session_abc_move_2_finalized");
        assert_eq!(last_auto_save("notetaker", &s("abc"), m2), "lastAutoSave_notetaker_abc_2");
    }

    #[test]
    fn ownership_handles_channel_keys() {
        let mine = s("abc");
        assert!(belongs_to("sharedTimer_session_abc", &mine));
        assert!(belongs_to("notes_session_abc_move_1", &mine));
        assert!(!belongs_to("notes_session_abcd_move_1", &mine));
        assert!(!belongs_to("sharedTimer_session_abcd", &mine));
        assert!(is_session_scoped("sharedTimer_session_abcd"));
        assert!(!is_session_scoped("currentSessionId"));
    }

    #[test]
    fn ownership_with_underscored_session_ids() {
        let short = s("a");
        let long = s("a_b");
        assert!(!belongs_to("notes_session_a_b_move_1", &short));
        assert!(belongs_to("notes_session_a_b_move_1", &long));
        assert!(belongs_to("whiteCell_session_a_b_move_3_finalized", &long));
        assert!(!belongs_to("sharedTimer_session_a_b", &short));
        assert_eq!(
            split_scoped("whiteCell_session_a_b_move_2_finalized"),
            Some(("whiteCell", "a_b"))
        );
        assert_eq!(split_scoped("sharedTimer_session_x_y"), Some(("sharedTimer", "x_y")));
        assert_eq!(split_scoped("currentSessionId"), None);
    }

    #[test]
    fn legacy_patterns() {
        assert!(legacy::is_legacy("blueFacilitatorMove2"));
        assert!(legacy::is_legacy("whiteCell_move_12"));
        assert!(!legacy::is_legacy("whiteCell_session_x_move_1"));
        assert!(!legacy::is_legacy("adjudications_move_1"));
    }
}
