use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

use crate::events::Detection;
use crate::state::InviteStatus;
use crate::timer::deadline_after;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Detection,
    Invite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifiedPlayer {
    pub user_id: String,
    pub display_name: String,
}

/// One entry of a webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    #[serde(rename = "type")]
    pub kind: RecordType,
    pub player: NotifiedPlayer,
    pub timestamp: DateTime<Utc>,
    pub outcome: InviteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl NotificationRecord {
    /// A detection has already been handed to the queue when it is reported.
    pub fn detection(detection: &Detection) -> Self {
        Self {
            kind: RecordType::Detection,
            player: NotifiedPlayer {
                user_id: detection.user_id.clone(),
                display_name: detection.display_name.clone(),
            },
            timestamp: detection.detected_at,
            outcome: InviteStatus::Queued,
            detail: None,
        }
    }

    pub fn invite(
        user_id: &str,
        display_name: &str,
        outcome: InviteStatus,
        detail: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: RecordType::Invite,
            player: NotifiedPlayer {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
            },
            timestamp: at,
            outcome,
            detail,
        }
    }
}

/// Records waiting for the next flush, in arrival order.
#[derive(Debug, Default)]
pub struct WebhookBatch {
    records: Vec<NotificationRecord>,
    first_buffered_at: Option<Instant>,
}

impl WebhookBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: NotificationRecord, now: Instant) {
        if self.records.is_empty() {
            self.first_buffered_at = Some(now);
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_buffered_at(&self) -> Option<Instant> {
        self.first_buffered_at
    }

    /// When the batch must be flushed by age, if it holds anything.
    pub fn deadline(&self, delay: Duration) -> Option<Instant> {
        self.first_buffered_at.map(|t| deadline_after(t, delay))
    }

    /// Take up to `max` records from the front, restarting the age clock
    /// for anything left behind.
    pub fn take(&mut self, max: usize, now: Instant) -> Vec<NotificationRecord> {
        let n = max.max(1).min(self.records.len());
        let taken: Vec<_> = self.records.drain(..n).collect();
        self.first_buffered_at = if self.records.is_empty() {
            None
        } else {
            Some(now)
        };
        taken
    }
}
