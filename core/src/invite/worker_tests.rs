//! Tests for the invite worker
//!
//! Run on a paused tokio clock against a scripted invite API, so pacing and
//! pauses can be asserted to the second.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;

use super::worker::{InviteWorker, QueueControl, QueueSnapshot, WorkerLinks};
use crate::api::{InviteApi, InviteOutcome};
use crate::error::HistoryError;
use crate::events::{Detection, EventKind, EventSink, StatusUpdate};
use crate::history::{HistoryEntry, InviteHistory, MemoryHistory};
use crate::session::{SessionSnapshot, SessionStatus};
use crate::state::InviteStatus;
use crate::webhook::{NotificationRecord, Notifier};
use autoinvite_types::InviteSettings;

const SELF_ID: &str = "usr_self";

/// Invite API answering from a per-user script; unscripted users succeed.
#[derive(Default)]
struct ScriptedInvite {
    script: Mutex<HashMap<String, VecDeque<InviteOutcome>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    latency: Duration,
}

impl ScriptedInvite {
    fn answer(&self, user: &str, outcomes: Vec<InviteOutcome>) {
        self.script
            .lock()
            .unwrap()
            .insert(user.to_string(), outcomes.into());
    }

    fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InviteApi for ScriptedInvite {
    async fn invite(&self, _: &SessionSnapshot, user_id: &str) -> InviteOutcome {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        self.calls
            .lock()
            .unwrap()
            .push((user_id.to_string(), Instant::now()));
        self.script
            .lock()
            .unwrap()
            .get_mut(user_id)
            .and_then(|q| q.pop_front())
            .unwrap_or(InviteOutcome::Success)
    }
}

fn active_session() -> SessionStatus {
    SessionStatus::Active(SessionSnapshot {
        token: "tok".to_string(),
        user_id: SELF_ID.to_string(),
        display_name: None,
        expires_at: Utc::now() + TimeDelta::days(1),
    })
}

fn detection(user: &str) -> Detection {
    Detection {
        user_id: user.to_string(),
        display_name: format!("Name of {user}"),
        generation: 1,
        world_id: Some("wrld_abc".to_string()),
        instance_id: Some("12345~region(us)".to_string()),
        detected_at: Utc::now(),
    }
}

struct Harness {
    api: Arc<ScriptedInvite>,
    history: Arc<MemoryHistory>,
    detections: mpsc::UnboundedSender<Detection>,
    control: mpsc::Sender<QueueControl>,
    session: watch::Sender<SessionStatus>,
    updates: mpsc::UnboundedReceiver<StatusUpdate>,
    notifications: mpsc::Receiver<NotificationRecord>,
    events: EventSink,
    snapshot: watch::Receiver<QueueSnapshot>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Harness {
    fn start(settings: InviteSettings, api: ScriptedInvite, session: SessionStatus) -> Self {
        Self::start_with(settings, api, session, &[])
    }

    /// Detections in `preload` are queued before the worker first runs.
    fn start_with(
        settings: InviteSettings,
        api: ScriptedInvite,
        session: SessionStatus,
        preload: &[Detection],
    ) -> Self {
        let api = Arc::new(api);
        let history = Arc::new(MemoryHistory::new());
        let (det_tx, det_rx) = mpsc::unbounded_channel();
        let (ctl_tx, ctl_rx) = mpsc::channel(8);
        let (session_tx, session_rx) = watch::channel(session);
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (notifier, notif_rx) = Notifier::channel();
        let events = EventSink::new();

        for d in preload {
            det_tx.send(d.clone()).unwrap();
        }

        let (worker, snapshot) = InviteWorker::new(
            settings,
            WorkerLinks {
                api: api.clone(),
                history: history.clone(),
                notifier,
                events: events.clone(),
                session_rx,
                status_tx,
            },
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(det_rx, ctl_rx, cancel.clone()));

        Self {
            api,
            history,
            detections: det_tx,
            control: ctl_tx,
            session: session_tx,
            updates: status_rx,
            notifications: notif_rx,
            events,
            snapshot,
            cancel,
            handle: Some(handle),
        }
    }

    async fn shutdown(mut self) -> Self {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap();
        }
        self
    }

    fn drain_updates(&mut self) -> Vec<StatusUpdate> {
        let mut out = Vec::new();
        while let Ok(u) = self.updates.try_recv() {
            out.push(u);
        }
        out
    }
}

// ─── Pacing ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_batches_are_paced() {
    let settings = InviteSettings::default();
    let users: Vec<_> = (0..20).map(|i| detection(&format!("usr_{i:02}"))).collect();
    let h = Harness::start_with(settings.clone(), ScriptedInvite::default(), active_session(), &users);

    sleep(Duration::from_secs(120)).await;
    let h = h.shutdown().await;

    let calls = h.api.calls();
    assert_eq!(calls.len(), 20);

    // Dispatch follows enqueue order.
    let order: Vec<_> = calls.iter().map(|(u, _)| u.clone()).collect();
    let expected: Vec<_> = (0..20).map(|i| format!("usr_{i:02}")).collect();
    assert_eq!(order, expected);

    // Consecutive sends are spaced, and never more than a batch between pauses.
    let mut run = 1;
    for pair in calls.windows(2) {
        let gap = pair[1].1 - pair[0].1;
        assert!(gap >= settings.delay_between(), "gap {gap:?} too short");
        if gap >= settings.batch_delay() {
            run = 1;
        } else {
            run += 1;
            assert!(run <= settings.batch_count, "more than a batch without a pause");
        }
    }
    assert_eq!(calls[8].1 - calls[7].1, settings.batch_delay());
}

#[tokio::test(start_paused = true)]
async fn test_backlog_over_threshold_halts_then_resumes() {
    let settings = InviteSettings::default();
    let users: Vec<_> = (0..90).map(|i| detection(&format!("usr_{i:02}"))).collect();
    let start = Instant::now();
    let h = Harness::start_with(settings.clone(), ScriptedInvite::default(), active_session(), &users);
    let mut events = h.events.subscribe();

    sleep(Duration::from_secs(599)).await;
    assert!(h.api.calls().is_empty(), "no dispatch during the backpressure pause");
    assert_eq!(h.snapshot.borrow().backlog, 90);
    assert!(h.snapshot.borrow().resume_at.is_some());

    let mut saw_rate = false;
    while let Ok(ev) = events.try_recv() {
        saw_rate |= ev.kind == EventKind::Rate;
    }
    assert!(saw_rate);

    sleep(Duration::from_secs(2)).await;
    let calls = h.api.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1 - start, settings.queue_pause_delay());

    // The valve fired once; the regular batch pacing applies from here.
    sleep(Duration::from_secs(30)).await;
    let calls = h.api.calls();
    assert!(calls.len() >= 8);
    assert!(calls.iter().all(|(_, at)| *at - start >= settings.queue_pause_delay()));

    h.shutdown().await;
}

// ─── Session gating ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_no_dispatch_without_valid_session() {
    let h = Harness::start(
        InviteSettings::default(),
        ScriptedInvite::default(),
        SessionStatus::Missing,
    );
    h.detections.send(detection("usr_111")).unwrap();

    sleep(Duration::from_secs(300)).await;
    assert!(h.api.calls().is_empty());
    assert_eq!(h.snapshot.borrow().backlog, 1);

    h.session.send_replace(active_session());
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.api.calls().len(), 1);

    // An expired session gates exactly like a missing one.
    h.session.send_replace(SessionStatus::Active(SessionSnapshot {
        token: "tok".to_string(),
        user_id: SELF_ID.to_string(),
        display_name: None,
        expires_at: Utc::now() - TimeDelta::seconds(1),
    }));
    h.detections.send(detection("usr_222")).unwrap();
    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.api.calls().len(), 1);

    h.shutdown().await;
}

// ─── Outcomes ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_marks_skipped_without_retry() {
    let api = ScriptedInvite::default();
    api.answer(
        "usr_111",
        vec![InviteOutcome::Permanent("already invited".to_string())],
    );
    let h = Harness::start(InviteSettings::default(), api, active_session());
    h.detections.send(detection("usr_111")).unwrap();

    sleep(Duration::from_secs(600)).await;
    let mut h = h.shutdown().await;

    assert_eq!(h.api.calls().len(), 1);
    assert_eq!(
        h.drain_updates(),
        vec![StatusUpdate {
            generation: 1,
            user_id: "usr_111".to_string(),
            status: InviteStatus::Skipped,
        }]
    );

    let history = h.history.entries();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, InviteStatus::Skipped);
    assert_eq!(history[0].detail.as_deref(), Some("already invited"));

    let record = h.notifications.try_recv().unwrap();
    assert_eq!(record.player.user_id, "usr_111");
    assert_eq!(record.outcome, InviteStatus::Skipped);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_retry_then_fail() {
    let settings = InviteSettings {
        max_retries: 2,
        retry_backoff_secs: 5,
        ..Default::default()
    };
    let api = ScriptedInvite::default();
    api.answer(
        "usr_111",
        vec![InviteOutcome::Transient("timeout".to_string()); 3],
    );
    let h = Harness::start(settings, api, active_session());
    h.detections.send(detection("usr_111")).unwrap();

    sleep(Duration::from_secs(120)).await;
    let mut h = h.shutdown().await;

    let calls = h.api.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1].1 - calls[0].1, Duration::from_secs(5));
    assert_eq!(calls[2].1 - calls[1].1, Duration::from_secs(10));

    let updates = h.drain_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].status, InviteStatus::Failed);
    assert_eq!(h.history.entries()[0].attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_transient_then_success_is_invited() {
    let api = ScriptedInvite::default();
    api.answer(
        "usr_111",
        vec![InviteOutcome::Transient("rate limited by remote".to_string())],
    );
    let h = Harness::start(InviteSettings::default(), api, active_session());
    h.detections.send(detection("usr_111")).unwrap();

    sleep(Duration::from_secs(60)).await;
    let mut h = h.shutdown().await;

    assert_eq!(h.api.calls().len(), 2);
    assert_eq!(h.drain_updates()[0].status, InviteStatus::Invited);
}

#[tokio::test(start_paused = true)]
async fn test_local_account_is_never_sent() {
    let h = Harness::start(
        InviteSettings::default(),
        ScriptedInvite::default(),
        active_session(),
    );
    h.detections.send(detection(SELF_ID)).unwrap();

    sleep(Duration::from_secs(10)).await;
    let mut h = h.shutdown().await;

    assert!(h.api.calls().is_empty());
    assert_eq!(h.drain_updates()[0].status, InviteStatus::Skipped);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_detection_is_queued_once() {
    let h = Harness::start(
        InviteSettings::default(),
        ScriptedInvite::default(),
        SessionStatus::Missing,
    );
    h.detections.send(detection("usr_111")).unwrap();
    h.detections.send(detection("usr_111")).unwrap();

    sleep(Duration::from_secs(1)).await;
    assert_eq!(h.snapshot.borrow().backlog, 1);
    h.shutdown().await;
}

/// History that notes which thread each write ran on.
#[derive(Default)]
struct ThreadNotingHistory {
    threads: Mutex<Vec<std::thread::ThreadId>>,
}

impl InviteHistory for ThreadNotingHistory {
    fn record(&self, _: &HistoryEntry) -> Result<(), HistoryError> {
        self.threads.lock().unwrap().push(std::thread::current().id());
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_history_is_written_off_the_runtime_thread() {
    let history = Arc::new(ThreadNotingHistory::default());
    let (det_tx, det_rx) = mpsc::unbounded_channel();
    let (_ctl_tx, ctl_rx) = mpsc::channel(8);
    let (_session_tx, session_rx) = watch::channel(active_session());
    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    let (worker, _snapshot) = InviteWorker::new(
        InviteSettings::default(),
        WorkerLinks {
            api: Arc::new(ScriptedInvite::default()),
            history: history.clone(),
            notifier: Notifier::disabled(),
            events: EventSink::new(),
            session_rx,
            status_tx,
        },
    );
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(worker.run(det_rx, ctl_rx, cancel.clone()));

    det_tx.send(detection("usr_111")).unwrap();
    let update = status_rx.recv().await.unwrap();
    assert_eq!(update.status, InviteStatus::Invited);
    cancel.cancel();
    handle.await.unwrap();

    // The current-thread test runtime runs every task on this thread.
    let threads = history.threads.lock().unwrap().clone();
    assert_eq!(threads.len(), 1);
    assert_ne!(threads[0], std::thread::current().id());
}

// ─── Control ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume() {
    let h = Harness::start(
        InviteSettings::default(),
        ScriptedInvite::default(),
        active_session(),
    );
    h.control.send(QueueControl::Pause).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    h.detections.send(detection("usr_111")).unwrap();

    sleep(Duration::from_secs(60)).await;
    assert!(h.api.calls().is_empty());
    assert!(h.snapshot.borrow().paused_by_user);

    h.control.send(QueueControl::Resume).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.api.calls().len(), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_live_settings_update_changes_spacing() {
    let h = Harness::start(
        InviteSettings::default(),
        ScriptedInvite::default(),
        active_session(),
    );
    h.control
        .send(QueueControl::UpdateSettings(InviteSettings {
            delay_between_secs: 30,
            ..Default::default()
        }))
        .await
        .unwrap();
    sleep(Duration::from_millis(10)).await;
    h.detections.send(detection("usr_1")).unwrap();
    h.detections.send(detection("usr_2")).unwrap();

    sleep(Duration::from_secs(60)).await;
    let h = h.shutdown().await;

    let calls = h.api.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].1 - calls[0].1, Duration::from_secs(30));
}

// ─── Shutdown ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_in_flight_send_finishes_on_shutdown() {
    let api = ScriptedInvite {
        latency: Duration::from_secs(5),
        ..Default::default()
    };
    let h = Harness::start(InviteSettings::default(), api, active_session());
    h.detections.send(detection("usr_111")).unwrap();

    sleep(Duration::from_secs(1)).await;
    let h = h.shutdown().await;

    assert_eq!(h.api.calls().len(), 1);
    assert_eq!(h.history.entries().len(), 1);
}
