//! Incremental reader for the growing game log.
//!
//! Each [`LogTailer::poll`] reads only the bytes appended since the last call,
//! buffers a trailing partial line, and returns the complete lines in order.
//! Rotation (a newer matching file, a replaced file, or truncation) resets the
//! offset to zero on the new file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memchr::memchr_iter;
use tracing::{debug, info};

use super::locate::{FilePattern, newest_matching};
use super::position::{FileFingerprint, LogPosition};
use crate::error::TailError;

/// Upper bound on bytes consumed per poll, so a huge backlog is spread over ticks.
const MAX_READ_PER_POLL: u64 = 4 * 1024 * 1024;

/// Where to begin when the first file is identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Skip existing content; only lines written after startup are seen.
    #[default]
    End,
    Beginning,
}

#[derive(Debug, Clone)]
pub struct TailerConfig {
    pub directory: PathBuf,
    pub pattern: FilePattern,
    pub start: StartPosition,
}

pub struct LogTailer {
    config: TailerConfig,
    position: Option<LogPosition>,
    partial: Vec<u8>,
}

impl LogTailer {
    pub fn new(config: TailerConfig) -> Self {
        Self {
            config,
            position: None,
            partial: Vec::new(),
        }
    }

    pub fn position(&self) -> Option<&LogPosition> {
        self.position.as_ref()
    }

    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// Read newly appended complete lines.
    pub fn poll(&mut self) -> Result<Vec<String>, TailError> {
        let (path, meta) = newest_matching(&self.config.directory, &self.config.pattern)?;
        let fingerprint = FileFingerprint::from_metadata(&meta);
        let len = meta.len();
        let mut lines = Vec::new();

        match &self.position {
            None => {
                let offset = match self.config.start {
                    StartPosition::End => len,
                    StartPosition::Beginning => 0,
                };
                info!(path = %path.display(), offset, "Tailing log file");
                self.position = Some(LogPosition::new(path, fingerprint, offset));
            }
            Some(pos) if pos.is_rotated(&path, &fingerprint, len) => {
                if pos.path != path {
                    self.drain_previous(&mut lines);
                }
                if !self.partial.is_empty() {
                    debug!(bytes = self.partial.len(), "Dropping partial line at rotation");
                    self.partial.clear();
                }
                info!(path = %path.display(), "Log rotated, reading new file from start");
                self.position = Some(LogPosition::new(path, fingerprint, 0));
            }
            Some(_) => {}
        }

        if let Some(pos) = self.position.as_mut() {
            read_appended(pos, len, &mut self.partial)?;
            split_complete_lines(&mut self.partial, &mut lines);
        }

        Ok(lines)
    }

    /// Read whatever the previous file gained since the last poll before
    /// switching away from it. Its final unterminated line counts as complete.
    fn drain_previous(&mut self, lines: &mut Vec<String>) {
        let Some(pos) = self.position.as_mut() else {
            return;
        };
        let Ok(meta) = std::fs::metadata(&pos.path) else {
            return;
        };
        if FileFingerprint::from_metadata(&meta) != pos.fingerprint || meta.len() <= pos.offset {
            return;
        }
        match read_appended(pos, meta.len(), &mut self.partial) {
            Ok(()) => {
                split_complete_lines(&mut self.partial, lines);
                if !self.partial.is_empty() {
                    lines.push(decode_line(&self.partial));
                    self.partial.clear();
                }
            }
            Err(e) => debug!(error = %e, "Could not drain previous log file"),
        }
    }
}

/// Append bytes `[pos.offset, len)` (bounded per poll) to `buf`.
fn read_appended(pos: &mut LogPosition, len: u64, buf: &mut Vec<u8>) -> Result<(), TailError> {
    if len <= pos.offset {
        return Ok(());
    }
    let io_err = |e| TailError::Io {
        path: pos.path.clone(),
        source: e,
    };

    let mut file = File::open(&pos.path).map_err(io_err)?;
    file.seek(SeekFrom::Start(pos.offset)).map_err(io_err)?;

    let want = (len - pos.offset).min(MAX_READ_PER_POLL);
    let read = file.take(want).read_to_end(buf).map_err(io_err)?;
    pos.offset += read as u64;
    Ok(())
}

/// Move every newline-terminated line out of `buf`, leaving the partial tail.
fn split_complete_lines(buf: &mut Vec<u8>, out: &mut Vec<String>) {
    let mut start = 0;
    for end in memchr_iter(b'\n', buf) {
        if end > start {
            let line = decode_line(&buf[start..end]);
            if !line.is_empty() {
                out.push(line);
            }
        }
        start = end + 1;
    }
    buf.drain(..start);
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
