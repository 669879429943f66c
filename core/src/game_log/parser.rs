use chrono::NaiveDateTime;

use super::event::ParsedEvent;
use super::rules::rules;

/// Classify a single log line.
///
/// Returns `None` for lines no rule recognizes; those are dropped silently.
/// Trailing `\r` / `\n` are ignored so CRLF logs parse the same as LF logs.
pub fn parse_line(line: &str) -> Option<ParsedEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return None;
    }
    let timestamp = parse_timestamp(line);
    rules().iter().find_map(|rule| rule.apply(line, timestamp))
}

/// Parse the `YYYY.MM.DD HH:MM:SS` prefix the game writes on every line.
pub fn parse_timestamp(line: &str) -> Option<NaiveDateTime> {
    let b = line.as_bytes();
    if b.len() < 19
        || b[4] != b'.'
        || b[7] != b'.'
        || b[10] != b' '
        || b[13] != b':'
        || b[16] != b':'
    {
        return None;
    }
    NaiveDateTime::parse_from_str(line.get(..19)?, "%Y.%m.%d %H:%M:%S").ok()
}
