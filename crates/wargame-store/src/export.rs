//! Export file sink
//!
//! Role exports and fallback migration backups are written as named JSON
//! files. The sink decides where they land.

use crate::error::{StoreError, StoreResult};
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::info;

/// Destination for exported files
pub trait ExportSink: Send + Sync {
    /// Persist `contents` under `filename`
    fn write(&self, filename: &str, contents: &str) -> StoreResult<()>;
}

/// Writes into a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Sink rooted at `dir` (created on first write)
    #[inline]
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ExportSink for DirectorySink {
    fn write(&self, filename: &str, contents: &str) -> StoreResult<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| StoreError::export(filename, e.to_string()))?;
        let path = self.dir.join(filename);
        std::fs::write(&path, contents).map_err(|e| StoreError::export(filename, e.to_string()))?;
        info!(path = %path.display(), bytes = contents.len(), "exported file");
        Ok(())
    }
}

/// Keeps exported files in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    /// Empty sink
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Files written so far, in order
    #[must_use]
    pub fn files(&self) -> Vec<(String, String)> {
        self.files.lock().clone()
    }
}

impl ExportSink for MemorySink {
    fn write(&self, filename: &str, contents: &str) -> StoreResult<()> {
        self.files
            .lock()
            .push((filename.to_string(), contents.to_string()));
        Ok(())
    }
}

/// `<prefix>_Session_<S>_<YYYY-MM-DD_HH-MM-SS>.json`
#[must_use]
pub fn export_filename(prefix: &str, session: &SessionId, at: DateTime<Utc>) -> String {
    format!("{prefix}_Session_{session}_{}.json", at.format("%Y-%m-%d_%H-%M-%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn filename_embeds_role_session_and_time() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            export_filename("WHITE_Cell", &SessionId::new("ex1"), at),
            "WHITE_Cell_Session_ex1_2025-03-04_05-06-07.json"
        );
    }

    #[test]
    fn directory_sink_writes_files() {
        let dir = TempDir::new().unwrap();
        let sink = DirectorySink::new(dir.path().join("exports"));
        sink.write("a.json", "{}").unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("exports/a.json")).unwrap(), "{}");
    }
}
