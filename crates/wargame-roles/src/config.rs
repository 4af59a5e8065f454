//! Runtime configuration
//!
//! Every field has a default matching the behavior of the role pages, so an
//! empty TOML file is a valid configuration.

use crate::error::{RoleError, RoleResult};
use crate::undo::DEFAULT_UNDO_LIMIT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use wargame_channel::TimerPolicy;
use wargame_store::{FileBackend, SessionKeyStore, DEFAULT_MAX_EVICTIONS};
use wargame_timeline::{TimelineWriter, DEFAULT_ATTEMPTS};

/// Polling periods in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollIntervals {
    /// Game state and timer
    pub state_ms: u64,
    /// Timeline refresh
    pub timeline_ms: u64,
    /// White Cell responses on the Facilitator page
    pub responses_ms: u64,
}

impl PollIntervals {
    /// Game state and timer period
    #[inline]
    #[must_use]
    pub fn state(&self) -> Duration {
        Duration::from_millis(self.state_ms)
    }

    /// Timeline period
    #[inline]
    #[must_use]
    pub fn timeline(&self) -> Duration {
        Duration::from_millis(self.timeline_ms)
    }

    /// Responses period
    #[inline]
    #[must_use]
    pub fn responses(&self) -> Duration {
        Duration::from_millis(self.responses_ms)
    }
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            state_ms: 1_000,
            timeline_ms: 5_000,
            responses_ms: 10_000,
        }
    }
}

/// Timeline append retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppendPolicy {
    /// Attempts before giving up
    pub attempts: u32,
    /// Backoff unit in milliseconds
    pub backoff_ms: u64,
}

impl Default for AppendPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff_ms: 50,
        }
    }
}

/// Wargame configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WargameConfig {
    /// JSON file backing the key store
    pub storage_path: PathBuf,
    /// Directory receiving exports and auto-saves
    pub export_dir: PathBuf,
    /// Storage quota in bytes; unlimited when absent
    pub storage_quota: Option<usize>,
    /// Keys evicted per quota recovery
    pub max_evictions: usize,
    /// Undo history length
    pub undo_limit: usize,
    /// Minimum seconds between auto-save exports
    pub autosave_interval_secs: u64,
    /// Polling periods
    pub polling: PollIntervals,
    /// Countdown defaults
    pub timer: TimerPolicy,
    /// Timeline append retries
    pub append: AppendPolicy,
}

impl WargameConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With storage file
    #[inline]
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    /// With export directory
    #[inline]
    #[must_use]
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = dir.into();
        self
    }

    /// With storage quota
    #[inline]
    #[must_use]
    pub fn with_storage_quota(mut self, bytes: usize) -> Self {
        self.storage_quota = Some(bytes);
        self
    }

    /// With undo history length
    #[inline]
    #[must_use]
    pub fn with_undo_limit(mut self, limit: usize) -> Self {
        self.undo_limit = limit;
        self
    }

    /// With auto-save throttle
    #[inline]
    #[must_use]
    pub fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval_secs = interval.as_secs();
        self
    }

    /// With timer policy
    #[inline]
    #[must_use]
    pub fn with_timer(mut self, timer: TimerPolicy) -> Self {
        self.timer = timer;
        self
    }

    /// Auto-save throttle
    #[inline]
    #[must_use]
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> RoleResult<Self> {
        toml::from_str(text).map_err(|e| RoleError::config("<inline>", e.to_string()))
    }

    /// Load a TOML file
    pub fn load(path: impl AsRef<Path>) -> RoleResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| RoleError::config(path, e.to_string()))?;
        let config: Self = toml::from_str(&text).map_err(|e| RoleError::config(path, e.to_string()))?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Open the file-backed key store described by this configuration
    pub fn open_store(&self) -> RoleResult<SessionKeyStore> {
        let mut backend = FileBackend::open(&self.storage_path).map_err(wargame_store::StoreError::from)?;
        if let Some(quota) = self.storage_quota {
            backend = backend.with_quota(quota);
        }
        Ok(SessionKeyStore::new(Arc::new(backend)).with_max_evictions(self.max_evictions))
    }

    /// Timeline writer using the configured retry policy
    #[must_use]
    pub fn timeline_writer(&self, store: Arc<SessionKeyStore>) -> TimelineWriter {
        TimelineWriter::new(store)
            .with_attempts(self.append.attempts)
            .with_backoff(Duration::from_millis(self.append.backoff_ms))
    }
}

impl Default for WargameConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("wargame-store.json"),
            export_dir: PathBuf::from("exports"),
            storage_quota: None,
            max_evictions: DEFAULT_MAX_EVICTIONS,
            undo_limit: DEFAULT_UNDO_LIMIT,
            autosave_interval_secs: 30,
            polling: PollIntervals::default(),
            timer: TimerPolicy::default(),
            append: AppendPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(WargameConfig::from_toml_str("").unwrap(), WargameConfig::default());
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = WargameConfig::from_toml_str(
            r#"
            storage_quota = 4096
            [polling]
            timeline_ms = 2000
            "#,
        )
        .unwrap();
        assert_eq!(config.storage_quota, Some(4096));
        assert_eq!(config.polling.timeline(), Duration::from_secs(2));
        assert_eq!(config.polling.state(), Duration::from_secs(1));
        assert_eq!(config.max_evictions, 10);
        assert_eq!(config.timer.default_secs, 5400);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = WargameConfig::from_toml_str("max_evictions = \"many\"").unwrap_err();
        assert!(matches!(err, RoleError::Config { .. }));
    }

    #[test]
    fn load_and_open_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wargame.toml");
        let store_path = dir.path().join("store.json");
        std::fs::write(
            &path,
            format!("storage_path = {:?}\nundo_limit = 5\n", store_path.display().to_string()),
        )
        .unwrap();
        let config = WargameConfig::load(&path).unwrap();
        assert_eq!(config.undo_limit, 5);
        let store = config.open_store().unwrap();
        assert!(store.set("k", &1));
        assert!(store_path.exists());
    }
}
