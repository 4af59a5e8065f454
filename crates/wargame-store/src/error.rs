//! Error types for the session store
//!
//! Provides error handling for:
//! - Backend writes (capacity, I/O)
//! - Store-level encoding and quota recovery
//! - Domain value parsing (moves, phases)

use std::path::PathBuf;

/// Errors raised by a raw storage backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Write would exceed the backend's capacity
    #[error("storage quota exceeded: {needed} bytes needed, {limit} bytes allowed")]
    QuotaExceeded {
        /// Bytes the backend would hold after the write
        needed: usize,
        /// Configured limit
        limit: usize,
    },

    /// File-backed store could not be read or written
    #[error("io error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Persisted snapshot is not a JSON object of strings
    #[error("malformed snapshot {path}: {message}")]
    MalformedSnapshot {
        /// File involved
        path: PathBuf,
        /// Decoder message
        message: String,
    },
}

impl BackendError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this is a capacity failure
    #[inline]
    #[must_use]
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Errors surfaced by [`crate::SessionKeyStore`]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Capacity still insufficient after evicting other sessions' data
    #[error("storage full for key '{key}' ({evicted} entries evicted)")]
    QuotaExceeded {
        /// Key being written
        key: String,
        /// Entries evicted before the retry
        evicted: usize,
    },

    /// Value could not be encoded as JSON
    #[error("failed to encode value for '{key}': {source}")]
    Encode {
        /// Key being written
        key: String,
        /// Encoder error
        #[source]
        source: serde_json::Error,
    },

    /// Non-capacity backend failure
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Export sink failure
    #[error("export failed for {filename}: {message}")]
    Export {
        /// Target file name
        filename: String,
        /// Failure detail
        message: String,
    },
}

impl StoreError {
    /// Create export error
    pub fn export(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Export {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Whether the failure is capacity-related
    #[inline]
    #[must_use]
    pub fn is_quota(&self) -> bool {
        match self {
            Self::QuotaExceeded { .. } => true,
            Self::Backend(inner) => inner.is_quota(),
            _ => false,
        }
    }
}

/// Errors parsing domain values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// Move number outside 1..=3
    #[error("move {0} out of range (1..=3)")]
    MoveOutOfRange(i64),

    /// Phase number or name not recognised
    #[error("unknown phase: '{0}'")]
    UnknownPhase(String),
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_detection_through_wrapping() {
        let raw = BackendError::QuotaExceeded {
            needed: 10,
            limit: 5,
        };
        assert!(raw.is_quota());
        assert!(StoreError::Backend(raw).is_quota());
        assert!(StoreError::QuotaExceeded {
            key: "k".into(),
            evicted: 0
        }
        .is_quota());
        assert!(!StoreError::export("a.json", "denied").is_quota());
    }

    #[test]
    fn error_display() {
        let err = StoreError::QuotaExceeded {
            key: "notes_session_s_move_1".into(),
            evicted: 3,
        };
        assert_eq!(
            err.to_string(),
            "storage full for key 'notes_session_s_move_1' (3 entries evicted)"
        );
        assert_eq!(
            ValueError::MoveOutOfRange(7).to_string(),
            "move 7 out of range (1..=3)"
        );
    }
}
