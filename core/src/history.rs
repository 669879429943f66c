//! Invite history
//!
//! Every final dispatch outcome is appended here. The tracker keeps no memory
//! across instances; anything longer-lived reads this record.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;
use crate::state::InviteStatus;

pub const HISTORY_FILE: &str = "history.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_id: String,
    pub display_name: String,
    pub world_id: Option<String>,
    pub instance_id: Option<String>,
    pub outcome: InviteStatus,
    pub detail: Option<String>,
    pub attempts: u32,
    pub at: DateTime<Utc>,
}

pub trait InviteHistory: Send + Sync {
    fn record(&self, entry: &HistoryEntry) -> Result<(), HistoryError>;
}

/// Appends one JSON object per line.
pub struct JsonlHistory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(HISTORY_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry back, skipping lines that no longer parse.
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(HistoryError::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };
        Ok(contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

impl InviteHistory for JsonlHistory {
    fn record(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let io_err = |e| HistoryError::Io {
            path: self.path.clone(),
            source: e,
        };
        // Serialize appends from concurrent callers; a poisoned lock is still usable.
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(line.as_bytes()).map_err(io_err)
    }
}

/// Keeps entries in memory. Used when no data directory is available.
#[derive(Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }
}

impl InviteHistory for MemoryHistory {
    fn record(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user: &str, outcome: InviteStatus) -> HistoryEntry {
        HistoryEntry {
            user_id: user.to_string(),
            display_name: user.to_string(),
            world_id: Some("wrld_abc".to_string()),
            instance_id: Some("12345".to_string()),
            outcome,
            detail: None,
            attempts: 1,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_jsonl_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let history = JsonlHistory::in_dir(&dir.path().join("nested"));

        history.record(&entry("usr_1", InviteStatus::Invited)).unwrap();
        history.record(&entry("usr_2", InviteStatus::Skipped)).unwrap();

        let raw = std::fs::read_to_string(history.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.contains("\"outcome\":\"skipped\""));

        let entries = history.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].user_id, "usr_1");
        assert_eq!(entries[1].outcome, InviteStatus::Skipped);
    }

    #[test]
    fn test_read_all_skips_damaged_lines() {
        let dir = tempfile::tempdir().unwrap();
        let history = JsonlHistory::in_dir(dir.path());
        history.record(&entry("usr_1", InviteStatus::Failed)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(history.path())
            .unwrap()
            .write_all(b"{truncated\n")
            .unwrap();

        assert_eq!(history.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_memory_history() {
        let history = MemoryHistory::new();
        history.record(&entry("usr_1", InviteStatus::Invited)).unwrap();
        assert_eq!(history.entries().len(), 1);
    }
}
