pub mod instance;
pub mod tracker;

#[cfg(test)]
mod tracker_tests;

pub use instance::{InstanceState, InviteStatus, Player};
pub use tracker::{InstanceTracker, TrackOutcome};
