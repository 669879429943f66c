//! Observability events
//!
//! Every notable thing the monitor does is tagged with an [`EventKind`],
//! logged through `tracing`, and broadcast to any subscribers (the CLI prints
//! them; tests assert on them).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Detect,
    Invite,
    Skip,
    Error,
    Auth,
    Rate,
    Queue,
    System,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detect => "detect",
            Self::Invite => "invite",
            Self::Skip => "skip",
            Self::Error => "error",
            Self::Auth => "auth",
            Self::Rate => "rate",
            Self::Queue => "queue",
            Self::System => "system",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub kind: EventKind,
    pub message: String,
    pub user_id: Option<String>,
    pub at: DateTime<Utc>,
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:<6} {}",
            self.at.format("%H:%M:%S"),
            self.kind,
            self.message
        )
    }
}

/// Cloneable emitter shared by every task.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<MonitorEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, kind: EventKind, message: impl Into<String>) {
        self.publish(kind, message.into(), None);
    }

    pub fn emit_for(&self, kind: EventKind, user_id: &str, message: impl Into<String>) {
        self.publish(kind, message.into(), Some(user_id.to_string()));
    }

    fn publish(&self, kind: EventKind, message: String, user_id: Option<String>) {
        let user = user_id.as_deref().unwrap_or("");
        match kind {
            EventKind::Error => error!(kind = %kind, user_id = user, "{message}"),
            EventKind::Rate | EventKind::Auth => warn!(kind = %kind, user_id = user, "{message}"),
            EventKind::Detect | EventKind::Queue => debug!(kind = %kind, user_id = user, "{message}"),
            _ => info!(kind = %kind, user_id = user, "{message}"),
        }

        // No subscribers is fine; the log line above is the record.
        let _ = self.tx.send(MonitorEvent {
            kind,
            message,
            user_id,
            at: Utc::now(),
        });
    }
}
