//! Human-readable formatting for durations and counts.
//!
//! Observability messages and the console status line go through this module
//! so pauses, backoffs and expiries read the same everywhere.

use std::time::Duration;

/// Format a duration compactly, dropping zero leading units.
///
/// - `>= 1h`: `Hh MMm`
/// - `>= 1m`: `Mm SSs`
/// - `< 1m`: `Ss` (sub-second values round up to `1s` unless zero)
///
/// # Examples
/// ```
/// use autoinvite_types::formatting::format_duration;
/// use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_secs(600)), "10m 00s");
/// assert_eq!(format_duration(Duration::from_secs(12)), "12s");
/// assert_eq!(format_duration(Duration::from_secs(3_720)), "1h 02m");
/// assert_eq!(format_duration(Duration::from_millis(500)), "1s");
/// assert_eq!(format_duration(Duration::ZERO), "0s");
/// ```
pub fn format_duration(d: Duration) -> String {
    let mut secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs += 1;
    }
    if secs >= 3_600 {
        format!("{}h {:02}m", secs / 3_600, (secs % 3_600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Format a count with a noun, pluralizing with a trailing `s`.
///
/// # Examples
/// ```
/// use autoinvite_types::formatting::format_count;
/// assert_eq!(format_count(1, "task"), "1 task");
/// assert_eq!(format_count(90, "task"), "90 tasks");
/// assert_eq!(format_count(0, "record"), "0 records");
/// ```
pub fn format_count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", n, noun)
    }
}

/// Format the time left until `secs` from now as `M:SS`, or `expired`.
///
/// # Examples
/// ```
/// use autoinvite_types::formatting::format_remaining;
/// assert_eq!(format_remaining(125), "2:05");
/// assert_eq!(format_remaining(0), "expired");
/// assert_eq!(format_remaining(-30), "expired");
/// ```
pub fn format_remaining(secs: i64) -> String {
    if secs <= 0 {
        return "expired".to_string();
    }
    format!("{}:{:02}", secs / 60, secs % 60)
}
