use chrono::{DateTime, NaiveDateTime, Utc};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Where a player stands in the invite pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    /// Seen, not yet handed to the invite worker.
    #[default]
    Pending,
    Queued,
    Invited,
    /// Never invited: the local account, or a permanent API refusal.
    Skipped,
    /// Transient failures exhausted the retry budget.
    Failed,
}

impl InviteStatus {
    /// Terminal statuses are never overwritten by a late intermediate update.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Invited | Self::Skipped | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub user_id: String,
    pub display_name: String,
    pub first_seen_at: DateTime<Utc>,
    /// Timestamp prefix of the join line, when the log carried one.
    pub joined_at_log: Option<NaiveDateTime>,
    /// Cleared by PlayerLeave, set again on rejoin.
    pub present: bool,
    pub invite_status: InviteStatus,
}

/// The instance the local user is currently in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceState {
    pub world_name: Option<String>,
    pub world_id: Option<String>,
    pub instance_id: Option<String>,
    pub region: Option<String>,
    pub entered_at: Option<DateTime<Utc>>,
    /// Monotonic counter incremented on every roster reset, even for the same instance.
    pub generation: u64,
    pub roster: HashMap<String, Player>,
}

impl InstanceState {
    pub fn player(&self, user_id: &str) -> Option<&Player> {
        self.roster.get(user_id)
    }

    pub fn present_count(&self) -> usize {
        self.roster.values().filter(|p| p.present).count()
    }

    pub fn count_with_status(&self, status: InviteStatus) -> usize {
        self.roster
            .values()
            .filter(|p| p.invite_status == status)
            .count()
    }

    /// Human-readable label such as `Test World (wrld_abc:12345)`.
    pub fn label(&self) -> String {
        let name = self.world_name.as_deref().unwrap_or("unknown world");
        match (&self.world_id, &self.instance_id) {
            (Some(w), Some(i)) => format!("{name} ({w}:{i})"),
            _ => name.to_string(),
        }
    }
}
