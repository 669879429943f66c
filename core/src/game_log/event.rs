use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A structured event recognized in a single log line.
///
/// Timestamps are the local wall-clock prefix of the line when present.
/// They are never filled from the current time, so replaying the same bytes
/// always yields the same events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParsedEvent {
    WorldEnter {
        world_name: String,
    },
    InstanceJoin {
        world_id: String,
        instance_id: String,
        region: Option<String>,
    },
    PlayerJoin {
        display_name: String,
        user_id: String,
        timestamp: Option<NaiveDateTime>,
    },
    PlayerLeave {
        display_name: String,
        user_id: String,
        timestamp: Option<NaiveDateTime>,
    },
}
