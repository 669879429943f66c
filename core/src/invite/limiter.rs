use tokio::time::{Duration, Instant};

use autoinvite_types::InviteSettings;

use crate::timer::deadline_after;

/// Send pacing: spacing between sends, a pause after every full batch, and
/// backpressure pauses imposed by the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimiterState {
    /// Sends in the current batch. Reset to zero whenever a pause starts.
    pub count: u32,
    pub last_sent_at: Option<Instant>,
    pub last_batch_completed_at: Option<Instant>,
    pub paused_until: Option<Instant>,
}

impl RateLimiterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest instant the next send may start.
    pub fn ready_at(&self, settings: &InviteSettings) -> Option<Instant> {
        let spacing = self.last_sent_at.map(|t| deadline_after(t, settings.delay_between()));
        match (spacing, self.paused_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_paused(&self, now: Instant) -> bool {
        self.paused_until.is_some_and(|t| t > now)
    }

    /// Count a completed send. Returns `true` when it closed a batch, which
    /// starts the `batch_delay` pause.
    pub fn record_send(&mut self, now: Instant, settings: &InviteSettings) -> bool {
        self.count += 1;
        self.last_sent_at = Some(now);
        if self.count >= settings.batch_count.max(1) {
            self.last_batch_completed_at = Some(now);
            self.pause_for(now, settings.batch_delay());
            true
        } else {
            false
        }
    }

    /// Halt dispatch for `duration`, extending any pause already running.
    pub fn pause_for(&mut self, now: Instant, duration: Duration) {
        let until = deadline_after(now, duration);
        self.paused_until = Some(self.paused_until.map_or(until, |t| t.max(until)));
        self.count = 0;
    }
}
