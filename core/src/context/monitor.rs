//! Task wiring
//!
//! [`start_monitor`] builds the channels between the loops, restores the
//! stored session and spawns everything onto the current runtime. The
//! returned [`MonitorHandle`] is the only way in from the outside.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Duration, Instant};
use tracing::info;

use autoinvite_types::{AppConfig, InviteSettings};

use super::background_tasks::BackgroundTasks;
use super::pipeline::{InstanceSummary, LogPipeline, PipelineLinks};
use crate::api::{AuthApi, InviteApi, WebhookClient};
use crate::events::{EventKind, EventSink, MonitorEvent};
use crate::game_log::TailerConfig;
use crate::history::InviteHistory;
use crate::invite::{InviteWorker, QueueControl, QueueSnapshot, WorkerLinks};
use crate::session::{SessionManager, SessionStatus, SessionStore};
use crate::webhook::{NotificationBatcher, Notifier};

/// Collaborators the monitor talks to.
pub struct MonitorDeps {
    pub invite_api: Arc<dyn InviteApi>,
    pub auth_api: Arc<dyn AuthApi>,
    /// `None` disables notifications entirely.
    pub webhook: Option<Arc<dyn WebhookClient>>,
    pub history: Arc<dyn InviteHistory>,
    pub session_store: Option<SessionStore>,
}

/// Point-in-time view for the `status` command.
#[derive(Debug, Clone)]
pub struct MonitorStatus {
    pub backlog: usize,
    pub paused_by_user: bool,
    pub resume_in: Option<Duration>,
    pub sent_in_batch: u32,
    pub session: SessionStatus,
    pub instance: InstanceSummary,
}

pub struct MonitorHandle {
    control_tx: mpsc::Sender<QueueControl>,
    events: EventSink,
    session_rx: watch::Receiver<SessionStatus>,
    queue_rx: watch::Receiver<QueueSnapshot>,
    instance_rx: watch::Receiver<InstanceSummary>,
    tasks: BackgroundTasks,
}

/// Spawn the pipeline, the invite worker, the session timer and, when a
/// webhook is configured, the notification batcher.
///
/// Must be called from within a tokio runtime.
pub fn start_monitor(config: &AppConfig, tailer: TailerConfig, deps: MonitorDeps) -> MonitorHandle {
    let events = EventSink::new();
    let mut tasks = BackgroundTasks::new();

    let (mut session, session_rx) = SessionManager::new(
        deps.auth_api,
        deps.session_store,
        config.session.clone(),
        events.clone(),
    );
    if !session.restore(Utc::now()) {
        events.emit(EventKind::Auth, "no stored session, run `login` to enable invites");
    }

    let notifier = match deps.webhook {
        Some(client) => {
            let (notifier, rx) = Notifier::channel();
            let batcher = NotificationBatcher::new(client, config.webhook.clone(), events.clone());
            tasks.spawn_flusher("notifications", batcher.run(rx, tasks.flush_token()));
            notifier
        }
        None => Notifier::disabled(),
    };

    let (detections_tx, detections_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = mpsc::unbounded_channel();
    let (control_tx, control_rx) = mpsc::channel(16);

    let (worker, queue_rx) = InviteWorker::new(
        config.invite.clone(),
        WorkerLinks {
            api: deps.invite_api,
            history: deps.history,
            notifier: notifier.clone(),
            events: events.clone(),
            session_rx: session_rx.clone(),
            status_tx,
        },
    );

    let (pipeline, instance_rx) = LogPipeline::new(
        tailer.clone(),
        config.log.poll_interval(),
        PipelineLinks {
            session_rx: session_rx.clone(),
            detections_tx,
            status_rx,
            notifier,
            events: events.clone(),
        },
    );

    tasks.spawn("session", session.run(tasks.token()));
    tasks.spawn("invites", worker.run(detections_rx, control_rx, tasks.token()));
    tasks.spawn("pipeline", pipeline.run(tasks.token()));

    info!(
        directory = %tailer.directory.display(),
        pattern = %tailer.pattern,
        "Monitor started"
    );
    events.emit(
        EventKind::System,
        format!("watching {} in {}", tailer.pattern, tailer.directory.display()),
    );

    MonitorHandle {
        control_tx,
        events,
        session_rx,
        queue_rx,
        instance_rx,
        tasks,
    }
}

impl MonitorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub async fn pause(&self) -> Result<(), String> {
        self.send(QueueControl::Pause).await
    }

    pub async fn resume(&self) -> Result<(), String> {
        self.send(QueueControl::Resume).await
    }

    pub async fn update_invite_settings(&self, settings: InviteSettings) -> Result<(), String> {
        self.send(QueueControl::UpdateSettings(settings)).await
    }

    pub fn status(&self) -> MonitorStatus {
        let queue = self.queue_rx.borrow().clone();
        let now = Instant::now();
        MonitorStatus {
            backlog: queue.backlog,
            paused_by_user: queue.paused_by_user,
            resume_in: queue
                .resume_at
                .map(|at| at.saturating_duration_since(now))
                .filter(|d| !d.is_zero()),
            sent_in_batch: queue.sent_in_batch,
            session: self.session_rx.borrow().clone(),
            instance: self.instance_rx.borrow().clone(),
        }
    }

    /// Stop polling, let an in-flight invite finish, flush notifications.
    pub async fn shutdown(self) {
        self.events.emit(EventKind::System, "shutting down");
        self.tasks.shutdown().await;
        info!("Monitor stopped");
    }

    async fn send(&self, cmd: QueueControl) -> Result<(), String> {
        self.control_tx.send(cmd).await.map_err(|e| e.to_string())
    }
}
