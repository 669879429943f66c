use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::events::Detection;

/// One pending invite, owned by the queue once handed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteTask {
    pub user_id: String,
    pub display_name: String,
    /// Instance generation the player was detected in.
    pub generation: u64,
    pub world_id: Option<String>,
    pub instance_id: Option<String>,
    pub queued_at: DateTime<Utc>,
    /// Sends attempted so far.
    pub attempts: u32,
    /// Earliest dispatch time after a transient failure.
    pub not_before: Option<Instant>,
}

impl InviteTask {
    pub fn from_detection(detection: Detection, queued_at: DateTime<Utc>) -> Self {
        Self {
            user_id: detection.user_id,
            display_name: detection.display_name,
            generation: detection.generation,
            world_id: detection.world_id,
            instance_id: detection.instance_id,
            queued_at,
            attempts: 0,
            not_before: None,
        }
    }

    /// Identity used to keep one task per player per instance.
    pub fn key(&self) -> (u64, String) {
        (self.generation, self.user_id.clone())
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.not_before.is_none_or(|t| t <= now)
    }
}
