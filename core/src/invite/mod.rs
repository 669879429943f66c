pub mod limiter;
pub mod queue;
pub mod task;
pub mod worker;

#[cfg(test)]
mod worker_tests;

pub use limiter::RateLimiterState;
pub use queue::{BlockReason, Completion, InviteQueue, NextAction};
pub use task::InviteTask;
pub use worker::{InviteWorker, QueueControl, QueueSnapshot, WorkerLinks};
