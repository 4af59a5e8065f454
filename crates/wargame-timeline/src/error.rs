//! Error types for timeline appends

/// Errors appending to the shared timeline
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    /// Draft is missing a required field; nothing was written
    #[error("timeline item missing required field: {0}")]
    MissingField(&'static str),

    /// Storage is full; the append was abandoned
    #[error("storage full while appending to {key}")]
    StorageFull {
        /// Record key
        key: String,
    },

    /// Every attempt failed
    #[error("append to {key} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Record key
        key: String,
        /// Attempts made
        attempts: u32,
        /// Last failure
        last: String,
    },
}

impl TimelineError {
    /// Create retries-exhausted error
    pub fn exhausted(key: impl Into<String>, attempts: u32, last: impl std::fmt::Display) -> Self {
        Self::RetriesExhausted {
            key: key.into(),
            attempts,
            last: last.to_string(),
        }
    }
}
