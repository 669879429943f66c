//! Invite dispatch loop
//!
//! The single consumer of detections. Owns the [`InviteQueue`] and is the
//! only task that sends invites. A send in flight is always awaited to
//! completion; cancellation is only observed between sends.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use autoinvite_types::InviteSettings;
use autoinvite_types::formatting::{format_count, format_duration};

use super::queue::{BlockReason, Completion, InviteQueue, NextAction};
use super::task::InviteTask;
use crate::api::{InviteApi, InviteOutcome};
use crate::events::{Detection, EventKind, EventSink, StatusUpdate};
use crate::history::{HistoryEntry, InviteHistory};
use crate::session::{SessionSnapshot, SessionStatus};
use crate::state::InviteStatus;
use crate::timer::sleep_until_opt;
use crate::webhook::{NotificationRecord, Notifier};

/// Operator commands flowing into the worker.
#[derive(Debug, Clone)]
pub enum QueueControl {
    Pause,
    Resume,
    UpdateSettings(InviteSettings),
}

/// Queue state published for status displays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub backlog: usize,
    pub paused_by_user: bool,
    /// Set while a batch or backpressure pause is running.
    pub resume_at: Option<Instant>,
    pub sent_in_batch: u32,
}

/// Everything the worker talks to besides its input channels.
pub struct WorkerLinks {
    pub api: Arc<dyn InviteApi>,
    pub history: Arc<dyn InviteHistory>,
    pub notifier: Notifier,
    pub events: EventSink,
    pub session_rx: watch::Receiver<SessionStatus>,
    pub status_tx: mpsc::UnboundedSender<StatusUpdate>,
}

pub struct InviteWorker {
    queue: InviteQueue,
    links: WorkerLinks,
    snapshot_tx: watch::Sender<QueueSnapshot>,
    last_block: Option<BlockReason>,
}

impl InviteWorker {
    pub fn new(settings: InviteSettings, links: WorkerLinks) -> (Self, watch::Receiver<QueueSnapshot>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(QueueSnapshot::default());
        (
            Self {
                queue: InviteQueue::new(settings),
                links,
                snapshot_tx,
                last_block: None,
            },
            snapshot_rx,
        )
    }

    pub async fn run(
        mut self,
        mut detections: mpsc::UnboundedReceiver<Detection>,
        mut control: mpsc::Receiver<QueueControl>,
        cancel: CancellationToken,
    ) {
        let mut detections_open = true;
        let mut control_open = true;
        let mut session_open = true;

        loop {
            let now = Instant::now();
            if let Some(until) = self.queue.check_backpressure(now) {
                self.links.events.emit(
                    EventKind::Rate,
                    format!(
                        "backlog of {} exceeds {}, dispatch halted for {}",
                        self.queue.len(),
                        self.queue.settings().queue_threshold,
                        format_duration(until.saturating_duration_since(now)),
                    ),
                );
            }

            let session = self.links.session_rx.borrow().usable(Utc::now()).cloned();
            let action = self.queue.next_action(now, session.is_some());
            self.note_block(&action);
            self.publish_snapshot();

            let wake = match action {
                NextAction::Dispatch(task) => {
                    if let Some(session) = session {
                        self.dispatch(task, &session).await;
                    }
                    continue;
                }
                NextAction::Wait(at) => Some(at),
                NextAction::Idle | NextAction::Blocked(_) => None,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                cmd = control.recv(), if control_open => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => control_open = false,
                },
                detection = detections.recv(), if detections_open => match detection {
                    Some(first) => {
                        self.enqueue(first);
                        // Take the whole burst so backpressure sees the real backlog.
                        while let Ok(more) = detections.try_recv() {
                            self.enqueue(more);
                        }
                    }
                    None => detections_open = false,
                },
                changed = self.links.session_rx.changed(), if session_open => {
                    if changed.is_err() {
                        session_open = false;
                    }
                }
                _ = sleep_until_opt(wake) => {}
            }
        }

        self.publish_snapshot();
        debug!(backlog = self.queue.len(), "Invite worker stopped");
    }

    fn enqueue(&mut self, detection: Detection) {
        let task = InviteTask::from_detection(detection, Utc::now());
        let user_id = task.user_id.clone();
        let name = task.display_name.clone();
        if self.queue.enqueue(task) {
            self.links.events.emit_for(
                EventKind::Queue,
                &user_id,
                format!("queued {name} ({} waiting)", self.queue.len()),
            );
        } else {
            debug!(user_id, "Duplicate detection ignored");
        }
    }

    fn apply(&mut self, cmd: QueueControl) {
        match cmd {
            QueueControl::Pause => {
                self.queue.pause();
                self.links.events.emit(EventKind::System, "dispatch paused");
            }
            QueueControl::Resume => {
                self.queue.resume();
                self.links.events.emit(EventKind::System, "dispatch resumed");
            }
            QueueControl::UpdateSettings(settings) => {
                self.queue.update_settings(settings);
                self.links
                    .events
                    .emit(EventKind::System, "invite settings updated");
            }
        }
    }

    async fn dispatch(&mut self, task: InviteTask, session: &SessionSnapshot) {
        if task.user_id == session.user_id {
            self.queue.discard(&task);
            self.finish(task, InviteStatus::Skipped, Some("local account".to_string()))
                .await;
            return;
        }

        debug!(user_id = %task.user_id, attempt = task.attempts, "Sending invite");
        let outcome = self.links.api.invite(session, &task.user_id).await;
        if let InviteOutcome::Transient(reason) = &outcome {
            warn!(user_id = %task.user_id, reason = %reason, "Transient invite failure");
        }

        let (completion, batch_closed) = self.queue.complete(task, outcome, Instant::now());
        match completion {
            Completion::Done {
                task,
                status,
                detail,
            } => self.finish(task, status, detail).await,
            Completion::Retrying {
                user_id,
                display_name,
                attempt,
                backoff,
                reason,
            } => self.links.events.emit_for(
                EventKind::Error,
                &user_id,
                format!(
                    "invite to {display_name} failed ({reason}), retry {attempt} in {}",
                    format_duration(backoff)
                ),
            ),
        }

        if batch_closed {
            let settings = self.queue.settings();
            self.links.events.emit(
                EventKind::Rate,
                format!(
                    "sent {}, pausing {}",
                    format_count(settings.batch_count as usize, "invite"),
                    format_duration(settings.batch_delay())
                ),
            );
        }
    }

    /// Report a final outcome to history, notifications, observability and
    /// back to the tracker.
    async fn finish(&self, task: InviteTask, status: InviteStatus, detail: Option<String>) {
        let at = Utc::now();
        let entry = HistoryEntry {
            user_id: task.user_id.clone(),
            display_name: task.display_name.clone(),
            world_id: task.world_id.clone(),
            instance_id: task.instance_id.clone(),
            outcome: status,
            detail: detail.clone(),
            attempts: task.attempts,
            at,
        };
        // File-backed history does blocking I/O; keep it off the runtime threads.
        let history = self.links.history.clone();
        match tokio::task::spawn_blocking(move || history.record(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to record invite history"),
            Err(e) => warn!(error = %e, "History writer task failed"),
        }

        self.links.notifier.notify(NotificationRecord::invite(
            &task.user_id,
            &task.display_name,
            status,
            detail.clone(),
            at,
        ));

        let reason = detail.map(|d| format!(" ({d})")).unwrap_or_default();
        let (kind, message) = match status {
            InviteStatus::Invited => (EventKind::Invite, format!("invited {}", task.display_name)),
            InviteStatus::Skipped => (
                EventKind::Skip,
                format!("skipped {}{reason}", task.display_name),
            ),
            _ => (
                EventKind::Error,
                format!(
                    "gave up on {} after {}{reason}",
                    task.display_name,
                    format_count(task.attempts as usize, "attempt")
                ),
            ),
        };
        self.links.events.emit_for(kind, &task.user_id, message);

        // The pipeline may already be gone during shutdown.
        let _ = self.links.status_tx.send(StatusUpdate {
            generation: task.generation,
            user_id: task.user_id,
            status,
        });
    }

    /// Emit an event when dispatch becomes blocked or unblocked.
    fn note_block(&mut self, action: &NextAction) {
        let block = match action {
            NextAction::Blocked(reason) => Some(*reason),
            _ => None,
        };
        if block == self.last_block {
            return;
        }
        match block {
            Some(BlockReason::NoSession) => self.links.events.emit(
                EventKind::Auth,
                format!(
                    "no valid session, holding {}",
                    format_count(self.queue.len(), "invite")
                ),
            ),
            Some(BlockReason::Paused) => {}
            None if self.last_block == Some(BlockReason::NoSession) => self
                .links
                .events
                .emit(EventKind::Auth, "session available, dispatch resumed"),
            None => {}
        }
        self.last_block = block;
    }

    fn publish_snapshot(&self) {
        let now = Instant::now();
        let limiter = self.queue.limiter();
        let snapshot = QueueSnapshot {
            backlog: self.queue.len(),
            paused_by_user: self.queue.is_user_paused(),
            resume_at: limiter.paused_until.filter(|t| *t > now),
            sent_in_batch: limiter.count,
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
