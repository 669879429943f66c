use tokio::time::{Duration, Instant, sleep_until};

/// Longest delay a deadline is ever pushed out by.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + delay`, capped at [`FAR_FUTURE`] so oversized configured delays
/// cannot overflow `Instant`.
pub(crate) fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay.min(FAR_FUTURE)).unwrap_or(now)
}

/// Sleep until `deadline`, or forever when there is none.
///
/// Lets a `select!` arm stay in place while a timer is disarmed.
pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
