//! Dispatch decisions
//!
//! [`InviteQueue`] holds the backlog and the rate limiter and decides, for a
//! given instant, whether the next task may go out. It performs no I/O; the
//! worker loop asks it what to do and reports back what happened.

use std::collections::VecDeque;

use hashbrown::HashSet;
use tokio::time::{Duration, Instant};

use autoinvite_types::InviteSettings;

use super::limiter::RateLimiterState;
use super::task::InviteTask;
use crate::api::InviteOutcome;
use crate::state::InviteStatus;
use crate::timer::deadline_after;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Paused by the operator.
    Paused,
    /// No session, or the session is past its expiry.
    NoSession,
}

#[derive(Debug, PartialEq, Eq)]
pub enum NextAction {
    Dispatch(InviteTask),
    /// Nothing may go out before this instant.
    Wait(Instant),
    Idle,
    Blocked(BlockReason),
}

/// What to do with a task after its send returned.
#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    Done {
        task: InviteTask,
        status: InviteStatus,
        detail: Option<String>,
    },
    Retrying {
        user_id: String,
        display_name: String,
        attempt: u32,
        backoff: Duration,
        reason: String,
    },
}

#[derive(Debug)]
pub struct InviteQueue {
    backlog: VecDeque<InviteTask>,
    keys: HashSet<(u64, String)>,
    limiter: RateLimiterState,
    settings: InviteSettings,
    valve_armed: bool,
    user_paused: bool,
}

impl InviteQueue {
    pub fn new(settings: InviteSettings) -> Self {
        Self {
            backlog: VecDeque::new(),
            keys: HashSet::new(),
            limiter: RateLimiterState::new(),
            settings,
            valve_armed: true,
            user_paused: false,
        }
    }

    pub fn len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backlog.is_empty()
    }

    pub fn settings(&self) -> &InviteSettings {
        &self.settings
    }

    pub fn limiter(&self) -> &RateLimiterState {
        &self.limiter
    }

    pub fn is_user_paused(&self) -> bool {
        self.user_paused
    }

    /// Add a task at the back. Returns `false` if this player already has a
    /// task for the same instance.
    pub fn enqueue(&mut self, task: InviteTask) -> bool {
        if !self.keys.insert(task.key()) {
            return false;
        }
        self.backlog.push_back(task);
        true
    }

    pub fn pause(&mut self) {
        self.user_paused = true;
    }

    pub fn resume(&mut self) {
        self.user_paused = false;
    }

    pub fn update_settings(&mut self, settings: InviteSettings) {
        self.settings = settings;
    }

    /// Trip the backpressure valve if the backlog is over the threshold.
    ///
    /// The valve fires once per excursion above the threshold and re-arms
    /// when the backlog falls back to it. Returns the pause deadline when it
    /// trips.
    pub fn check_backpressure(&mut self, now: Instant) -> Option<Instant> {
        let over = self.backlog.len() > self.settings.queue_threshold;
        if !over {
            self.valve_armed = true;
            return None;
        }
        if !self.valve_armed {
            return None;
        }
        self.valve_armed = false;
        self.limiter.pause_for(now, self.settings.queue_pause_delay());
        self.limiter.paused_until
    }

    /// Decide what the worker should do at `now`.
    pub fn next_action(&mut self, now: Instant, session_usable: bool) -> NextAction {
        if self.backlog.is_empty() {
            return NextAction::Idle;
        }
        if self.user_paused {
            return NextAction::Blocked(BlockReason::Paused);
        }
        if !session_usable {
            return NextAction::Blocked(BlockReason::NoSession);
        }
        if let Some(ready) = self.limiter.ready_at(&self.settings) {
            if ready > now {
                return NextAction::Wait(ready);
            }
        }

        match self.backlog.iter().position(|t| t.is_due(now)) {
            Some(idx) => match self.backlog.remove(idx) {
                Some(mut task) => {
                    task.attempts += 1;
                    NextAction::Dispatch(task)
                }
                None => NextAction::Idle,
            },
            None => self
                .backlog
                .iter()
                .filter_map(|t| t.not_before)
                .min()
                .map_or(NextAction::Idle, NextAction::Wait),
        }
    }

    /// Account for a finished send. The second value is `true` when the send
    /// closed a batch and the batch pause has started.
    pub fn complete(
        &mut self,
        mut task: InviteTask,
        outcome: InviteOutcome,
        now: Instant,
    ) -> (Completion, bool) {
        let batch_closed = self.limiter.record_send(now, &self.settings);

        let completion = match outcome {
            InviteOutcome::Success => self.finish(task, InviteStatus::Invited, None),
            InviteOutcome::Permanent(reason) => {
                self.finish(task, InviteStatus::Skipped, Some(reason))
            }
            InviteOutcome::Transient(reason) if task.attempts <= self.settings.max_retries => {
                let backoff = self.settings.retry_backoff(task.attempts);
                task.not_before = Some(deadline_after(now, backoff));
                let completion = Completion::Retrying {
                    user_id: task.user_id.clone(),
                    display_name: task.display_name.clone(),
                    attempt: task.attempts,
                    backoff,
                    reason,
                };
                self.backlog.push_back(task);
                completion
            }
            InviteOutcome::Transient(reason) => {
                self.finish(task, InviteStatus::Failed, Some(reason))
            }
        };
        (completion, batch_closed)
    }

    /// Drop a dispatched task without sending it.
    pub fn discard(&mut self, task: &InviteTask) {
        self.keys.remove(&task.key());
    }

    fn finish(&mut self, task: InviteTask, status: InviteStatus, detail: Option<String>) -> Completion {
        self.keys.remove(&task.key());
        Completion::Done {
            task,
            status,
            detail,
        }
    }
}
