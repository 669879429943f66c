//! Log file discovery
//!
//! The game writes a new `output_log_<date>.txt` on every launch, so the file
//! to tail is whichever matching file was modified most recently.

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::TailError;

/// A filename pattern with at most one `*` wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    prefix: String,
    suffix: String,
    wildcard: bool,
}

impl FilePattern {
    pub fn new(pattern: &str) -> Self {
        match pattern.split_once('*') {
            Some((prefix, suffix)) => Self {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
                wildcard: true,
            },
            None => Self {
                prefix: pattern.to_string(),
                suffix: String::new(),
                wildcard: false,
            },
        }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        if !self.wildcard {
            return file_name == self.prefix;
        }
        file_name.len() >= self.prefix.len() + self.suffix.len()
            && file_name.starts_with(&self.prefix)
            && file_name.ends_with(&self.suffix)
    }
}

impl std::fmt::Display for FilePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.wildcard {
            write!(f, "{}*{}", self.prefix, self.suffix)
        } else {
            write!(f, "{}", self.prefix)
        }
    }
}

/// Find the most recently modified file in `dir` matching `pattern`.
pub fn newest_matching(dir: &Path, pattern: &FilePattern) -> Result<(PathBuf, Metadata), TailError> {
    if !dir.is_dir() {
        return Err(TailError::DirectoryMissing(dir.to_path_buf()));
    }

    let entries = fs::read_dir(dir).map_err(|e| TailError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut newest: Option<(PathBuf, Metadata, SystemTime)> = None;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !pattern.matches(name) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        // Ties resolve to the lexically greater name; dated filenames sort chronologically.
        let is_newer = match &newest {
            None => true,
            Some((path, _, best)) => {
                modified > *best || (modified == *best && entry.path() > *path)
            }
        };
        if is_newer {
            newest = Some((entry.path(), meta, modified));
        }
    }

    newest
        .map(|(path, meta, _)| (path, meta))
        .ok_or_else(|| TailError::NoMatchingFile {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        })
}

/// Platform default log directory, if one is known.
pub fn default_log_directory() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %LOCALAPPDATA%Low sits next to %LOCALAPPDATA%
        dirs::data_local_dir()
            .and_then(|local| local.parent().map(|p| p.join("LocalLow").join("VRChat").join("VRChat")))
    }
    #[cfg(not(target_os = "windows"))]
    {
        None
    }
}

/// Resolve the configured directory, falling back to the platform default.
pub fn resolve_log_directory(configured: &str) -> Option<PathBuf> {
    if configured.trim().is_empty() {
        default_log_directory()
    } else {
        Some(PathBuf::from(configured))
    }
}
