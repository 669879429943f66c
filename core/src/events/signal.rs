use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::InviteStatus;

/// A newly sighted player, handed from the tracker to the invite worker.
///
/// `generation` identifies the instance the player was seen in; it increases
/// every time the roster is reset, so late outcomes for an old instance can be
/// recognized and discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub user_id: String,
    pub display_name: String,
    pub generation: u64,
    pub world_id: Option<String>,
    pub instance_id: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// Final (or intermediate) invite status flowing back to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub generation: u64,
    pub user_id: String,
    pub status: InviteStatus,
}
