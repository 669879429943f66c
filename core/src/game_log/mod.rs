//! Game log ingestion: file discovery, incremental tailing and line parsing.

mod event;
mod locate;
mod parser;
mod position;
mod rules;
mod tailer;

pub use event::ParsedEvent;
pub use locate::{FilePattern, default_log_directory, newest_matching, resolve_log_directory};
pub use parser::{parse_line, parse_timestamp};
pub use position::{FileFingerprint, LogPosition};
pub use rules::{MatchRule, rules};
pub use tailer::{LogTailer, StartPosition, TailerConfig};
