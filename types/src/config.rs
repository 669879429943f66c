//! Persisted application settings.
//!
//! Every section is `#[serde(default)]` so a config file written by an older
//! version (or a hand-edited one with only a few keys) still loads.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration persisted to `autoinvite/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log: LogSettings,
    pub invite: InviteSettings,
    pub session: SessionSettings,
    pub webhook: WebhookSettings,
    pub api: ApiSettings,
}

// ─────────────────────────────────────────────────────────────────────────────
// Log source
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Directory holding the rotating log files. Empty means platform default.
    pub log_directory: String,
    /// Filename pattern with a single `*` wildcard.
    pub file_pattern: String,
    pub poll_interval_ms: u64,
    /// Read the current file from byte 0 instead of its end on startup.
    pub start_from_beginning: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            log_directory: String::new(),
            file_pattern: "output_log_*.txt".to_string(),
            poll_interval_ms: 500,
            start_from_beginning: false,
        }
    }
}

impl LogSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Invite dispatch
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InviteSettings {
    /// Sends per batch before `batch_delay_secs` is enforced.
    pub batch_count: u32,
    pub batch_delay_secs: u64,
    pub delay_between_secs: u64,
    /// Backlog length above which dispatch halts for `queue_pause_delay_secs`.
    pub queue_threshold: usize,
    pub queue_pause_delay_secs: u64,
    /// Transient failures retried at most this many times.
    pub max_retries: u32,
    /// First retry backoff; doubles per attempt, capped at five minutes.
    pub retry_backoff_secs: u64,
}

impl Default for InviteSettings {
    fn default() -> Self {
        Self {
            batch_count: 8,
            batch_delay_secs: 12,
            delay_between_secs: 2,
            queue_threshold: 88,
            queue_pause_delay_secs: 600,
            max_retries: 3,
            retry_backoff_secs: 5,
        }
    }
}

impl InviteSettings {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_secs)
    }

    pub fn delay_between(&self) -> Duration {
        Duration::from_secs(self.delay_between_secs)
    }

    pub fn queue_pause_delay(&self) -> Duration {
        Duration::from_secs(self.queue_pause_delay_secs)
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        const MAX_BACKOFF_SECS: u64 = 300;
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_secs(
            self.retry_backoff_secs
                .saturating_mul(factor)
                .min(MAX_BACKOFF_SECS),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub validation_interval_secs: u64,
    /// Hard lifetime of a session regardless of validation results.
    pub duration_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            validation_interval_secs: 300,
            duration_secs: 86_400,
        }
    }
}

impl SessionSettings {
    pub fn validation_interval(&self) -> Duration {
        Duration::from_secs(self.validation_interval_secs.max(1))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook notifications
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Notifications are disabled when unset.
    pub url: Option<String>,
    pub batch_delay_secs: u64,
    pub max_batch_size: usize,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            url: None,
            batch_delay_secs: 5,
            max_batch_size: 4,
        }
    }
}

impl WebhookSettings {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote API
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    /// The remote API rejects requests without an identifying agent.
    pub user_agent: String,
    /// Group that detected players are invited into.
    pub group_id: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.vrchat.cloud/api/1".to_string(),
            user_agent: concat!("autoinvite/", env!("CARGO_PKG_VERSION")).to_string(),
            group_id: String::new(),
            request_timeout_secs: 15,
        }
    }
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
