//! Tail, parse, track
//!
//! The single writer of instance state. Each poll tick reads new log lines,
//! classifies them, feeds the tracker, and hands first sightings to the
//! invite worker. Outcomes coming back from the worker are applied here too.

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::events::{Detection, EventKind, EventSink, StatusUpdate};
use crate::game_log::{LogTailer, StartPosition, TailerConfig, parse_line};
use crate::session::SessionStatus;
use crate::state::{InstanceTracker, InviteStatus, TrackOutcome};
use crate::webhook::{NotificationRecord, Notifier};

/// Current instance as shown by `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceSummary {
    pub label: Option<String>,
    pub present: usize,
    pub queued: usize,
    pub invited: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct PipelineLinks {
    pub session_rx: watch::Receiver<SessionStatus>,
    pub detections_tx: mpsc::UnboundedSender<Detection>,
    pub status_rx: mpsc::UnboundedReceiver<StatusUpdate>,
    pub notifier: Notifier,
    pub events: EventSink,
}

pub struct LogPipeline {
    tailer_config: TailerConfig,
    tailer: Option<LogTailer>,
    tracker: InstanceTracker,
    poll_interval: Duration,
    links: PipelineLinks,
    summary_tx: watch::Sender<InstanceSummary>,
    last_error: Option<String>,
}

impl LogPipeline {
    pub fn new(
        tailer_config: TailerConfig,
        poll_interval: Duration,
        links: PipelineLinks,
    ) -> (Self, watch::Receiver<InstanceSummary>) {
        let (summary_tx, summary_rx) = watch::channel(InstanceSummary::default());
        (
            Self {
                tailer: Some(LogTailer::new(tailer_config.clone())),
                tailer_config,
                tracker: InstanceTracker::new(),
                poll_interval,
                links,
                summary_tx,
                last_error: None,
            },
            summary_rx,
        )
    }

    pub fn tracker(&self) -> &InstanceTracker {
        &self.tracker
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = interval(self.poll_interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(update) = self.links.status_rx.recv() => self.apply_status(&update),
                _ = ticker.tick() => self.poll_once().await,
            }
        }
        debug!("Log pipeline stopped");
    }

    /// Read and process whatever the log gained since the last tick.
    async fn poll_once(&mut self) {
        let mut tailer = match self.tailer.take() {
            Some(t) => t,
            None => LogTailer::new(TailerConfig {
                start: StartPosition::End,
                ..self.tailer_config.clone()
            }),
        };

        let joined = tokio::task::spawn_blocking(move || {
            let result = tailer.poll();
            (tailer, result)
        })
        .await;

        match joined {
            Ok((tailer, Ok(lines))) => {
                self.tailer = Some(tailer);
                if self.last_error.take().is_some() {
                    self.links
                        .events
                        .emit(EventKind::System, "log source readable again");
                }
                for line in &lines {
                    self.process_line(line);
                }
            }
            Ok((tailer, Err(e))) => {
                self.tailer = Some(tailer);
                let message = e.to_string();
                // Report once per distinct failure; retried every tick.
                if self.last_error.as_deref() != Some(message.as_str()) {
                    self.links
                        .events
                        .emit(EventKind::Error, format!("log source unavailable: {message}"));
                    self.last_error = Some(message);
                }
            }
            Err(e) => {
                error!(error = %e, "Log reader task failed, restarting at end of file");
                self.links
                    .events
                    .emit(EventKind::Error, "log reader failed, restarted");
            }
        }
    }

    /// Parse one line and feed the tracker.
    pub fn process_line(&mut self, line: &str) {
        let Some(event) = parse_line(line) else {
            return;
        };
        let local_user = self.links.session_rx.borrow().user_id().map(str::to_string);

        match self.tracker.handle(&event, local_user.as_deref(), Utc::now()) {
            TrackOutcome::Ignored => return,
            TrackOutcome::InstanceChanged { generation, label } => {
                debug!(generation, "Roster reset");
                self.links
                    .events
                    .emit(EventKind::System, format!("entered {label}"));
            }
            TrackOutcome::WorldNamed { label } => {
                debug!(label = %label, "World name merged into instance");
            }
            TrackOutcome::Detected(detection) => self.hand_off(detection),
            TrackOutcome::LocalUserSeen { user_id } => {
                self.links
                    .events
                    .emit_for(EventKind::Skip, &user_id, "local account, not invited");
            }
            TrackOutcome::PlayerLeft {
                user_id,
                display_name,
            } => {
                debug!(user_id = %user_id, name = %display_name, "Player left");
            }
        }
        self.publish_summary();
    }

    fn hand_off(&mut self, detection: Detection) {
        self.links.events.emit_for(
            EventKind::Detect,
            &detection.user_id,
            format!("detected {}", detection.display_name),
        );
        self.links
            .notifier
            .notify(NotificationRecord::detection(&detection));

        let update = StatusUpdate {
            generation: detection.generation,
            user_id: detection.user_id.clone(),
            status: InviteStatus::Queued,
        };
        match self.links.detections_tx.send(detection) {
            Ok(()) => {
                self.tracker.apply_status(&update);
            }
            Err(e) => warn!(user_id = %e.0.user_id, "Invite worker gone, detection dropped"),
        }
    }

    fn apply_status(&mut self, update: &StatusUpdate) {
        if self.tracker.apply_status(update) {
            self.publish_summary();
        } else {
            debug!(user_id = %update.user_id, generation = update.generation, "Stale status update ignored");
        }
    }

    fn publish_summary(&self) {
        let summary = match self.tracker.current() {
            Some(state) => InstanceSummary {
                label: Some(state.label()),
                present: state.present_count(),
                queued: state.count_with_status(InviteStatus::Queued),
                invited: state.count_with_status(InviteStatus::Invited),
                skipped: state.count_with_status(InviteStatus::Skipped),
                failed: state.count_with_status(InviteStatus::Failed),
            },
            None => InstanceSummary::default(),
        };
        self.summary_tx.send_replace(summary);
    }
}
