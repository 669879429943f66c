use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Identity of a log file, used to detect rotation under the same path.
///
/// On unix the inode is authoritative. Elsewhere the creation time stands in;
/// if neither is available only the path and size checks apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub inode: Option<u64>,
    pub created: Option<SystemTime>,
}

impl FileFingerprint {
    pub fn from_metadata(meta: &Metadata) -> Self {
        #[cfg(unix)]
        let inode = {
            use std::os::unix::fs::MetadataExt;
            Some(meta.ino())
        };
        #[cfg(not(unix))]
        let inode = None;

        Self {
            inode,
            created: meta.created().ok(),
        }
    }
}

/// How far into which file the tailer has consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPosition {
    pub path: PathBuf,
    pub fingerprint: FileFingerprint,
    /// Bytes already consumed, including any buffered partial line.
    pub offset: u64,
}

impl LogPosition {
    pub fn new(path: PathBuf, fingerprint: FileFingerprint, offset: u64) -> Self {
        Self {
            path,
            fingerprint,
            offset,
        }
    }

    /// Whether `path` with `fingerprint` and length `len` is a different file
    /// (or the same path rotated/truncated) relative to this position.
    pub fn is_rotated(&self, path: &Path, fingerprint: &FileFingerprint, len: u64) -> bool {
        self.path != path || &self.fingerprint != fingerprint || len < self.offset
    }
}
