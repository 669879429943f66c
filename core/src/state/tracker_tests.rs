//! Tests for the instance tracker
//!
//! Drives the tracker with parsed log lines, the same way the pipeline does.

use chrono::{DateTime, TimeZone, Utc};

use super::instance::InviteStatus;
use super::tracker::{InstanceTracker, TrackOutcome};
use crate::events::StatusUpdate;
use crate::game_log::{ParsedEvent, parse_line};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 20, 31, 0).unwrap()
}

fn event(line: &str) -> ParsedEvent {
    parse_line(line).unwrap_or_else(|| panic!("line should parse: {line}"))
}

/// Feed lines through the tracker, collecting every outcome.
fn feed(tracker: &mut InstanceTracker, lines: &[&str], local: Option<&str>) -> Vec<TrackOutcome> {
    lines
        .iter()
        .map(|l| tracker.handle(&event(l), local, now()))
        .collect()
}

fn detections(outcomes: &[TrackOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .filter_map(|o| match o {
            TrackOutcome::Detected(d) => Some(d.user_id.clone()),
            _ => None,
        })
        .collect()
}

// ─── Scenarios ──────────────────────────────────────────────────────────────

#[test]
fn test_enter_join_and_detect() {
    let mut tracker = InstanceTracker::new();
    let outcomes = feed(
        &mut tracker,
        &[
            "Entering Room: Test World",
            "Joining wrld_abc:12345~region(us)",
            "OnPlayerJoined Alice (usr_111)",
        ],
        None,
    );

    assert_eq!(detections(&outcomes), vec!["usr_111".to_string()]);

    let state = tracker.current().expect("in an instance");
    assert_eq!(state.world_name.as_deref(), Some("Test World"));
    assert_eq!(state.world_id.as_deref(), Some("wrld_abc"));
    assert_eq!(state.instance_id.as_deref(), Some("12345~region(us)"));
    assert_eq!(state.region.as_deref(), Some("us"));
    assert_eq!(state.roster.len(), 1);
    assert_eq!(
        state.player("usr_111").unwrap().invite_status,
        InviteStatus::Pending
    );

    let TrackOutcome::Detected(d) = &outcomes[2] else {
        panic!("expected detection, got {:?}", outcomes[2]);
    };
    assert_eq!(d.display_name, "Alice");
    assert_eq!(d.generation, state.generation);
    assert_eq!(d.world_id.as_deref(), Some("wrld_abc"));
}

#[test]
fn test_duplicate_join_is_idempotent() {
    let mut tracker = InstanceTracker::new();
    let outcomes = feed(
        &mut tracker,
        &[
            "Entering Room: Test World",
            "Joining wrld_abc:12345~region(us)",
            "OnPlayerJoined Alice (usr_111)",
            "OnPlayerJoined Alice (usr_111)",
        ],
        None,
    );

    assert_eq!(detections(&outcomes).len(), 1);
    assert_eq!(outcomes[3], TrackOutcome::Ignored);
    assert_eq!(tracker.current().unwrap().roster.len(), 1);
}

#[test]
fn test_roster_empty_after_instance_join() {
    let mut tracker = InstanceTracker::new();
    feed(
        &mut tracker,
        &[
            "Joining wrld_abc:1",
            "OnPlayerJoined Alice (usr_111)",
            "OnPlayerJoined Bob (usr_222)",
        ],
        None,
    );
    assert_eq!(tracker.current().unwrap().roster.len(), 2);
    let first_generation = tracker.generation();

    let outcome = tracker.handle(&event("Joining wrld_xyz:2"), None, now());
    assert!(matches!(outcome, TrackOutcome::InstanceChanged { .. }));
    assert!(tracker.current().unwrap().roster.is_empty());
    assert!(tracker.generation() > first_generation);
}

#[test]
fn test_same_player_detected_again_in_new_instance() {
    let mut tracker = InstanceTracker::new();
    let outcomes = feed(
        &mut tracker,
        &[
            "Joining wrld_abc:1",
            "OnPlayerJoined Alice (usr_111)",
            "Joining wrld_abc:2",
            "OnPlayerJoined Alice (usr_111)",
        ],
        None,
    );
    assert_eq!(detections(&outcomes).len(), 2);
}

// ─── Transitions ────────────────────────────────────────────────────────────

#[test]
fn test_join_without_instance_is_dropped() {
    let mut tracker = InstanceTracker::new();
    let outcome = tracker.handle(&event("OnPlayerJoined Alice (usr_111)"), None, now());
    assert_eq!(outcome, TrackOutcome::Ignored);
    assert!(tracker.current().is_none());
}

#[test]
fn test_world_enter_right_after_instance_join_only_sets_name() {
    let mut tracker = InstanceTracker::new();
    let outcomes = feed(
        &mut tracker,
        &["Joining wrld_abc:12345", "Entering Room: Late Name"],
        None,
    );
    let generation = tracker.generation();

    assert!(matches!(outcomes[1], TrackOutcome::WorldNamed { .. }));
    let state = tracker.current().unwrap();
    assert_eq!(state.world_name.as_deref(), Some("Late Name"));
    assert_eq!(state.world_id.as_deref(), Some("wrld_abc"));

    // Players joining afterwards belong to the same generation.
    tracker.handle(&event("OnPlayerJoined Alice (usr_111)"), None, now());
    assert_eq!(tracker.generation(), generation);
    assert_eq!(tracker.current().unwrap().roster.len(), 1);
}

#[test]
fn test_both_room_lines_after_instance_join_keep_location() {
    let mut tracker = InstanceTracker::new();
    let outcomes = feed(
        &mut tracker,
        &[
            "Joining wrld_abc:12345~region(us)",
            "Joining or Creating Room: Test World",
            "Entering Room: Test World",
        ],
        None,
    );
    let generation = tracker.generation();

    assert!(matches!(outcomes[1], TrackOutcome::WorldNamed { .. }));
    assert!(matches!(outcomes[2], TrackOutcome::WorldNamed { .. }));
    let state = tracker.current().unwrap();
    assert_eq!(state.world_id.as_deref(), Some("wrld_abc"));
    assert_eq!(state.instance_id.as_deref(), Some("12345~region(us)"));
    assert_eq!(state.region.as_deref(), Some("us"));
    assert_eq!(state.label(), "Test World (wrld_abc:12345~region(us))");

    // Any other event closes the window again.
    tracker.handle(&event("OnPlayerJoined Alice (usr_111)"), None, now());
    assert_eq!(tracker.generation(), generation);
    tracker.handle(&event("Entering Room: Somewhere Else"), None, now());
    assert_ne!(tracker.generation(), generation);
    assert_eq!(tracker.current().unwrap().world_id, None);
}

#[test]
fn test_instance_join_after_merged_name_keeps_it() {
    let mut tracker = InstanceTracker::new();
    feed(
        &mut tracker,
        &[
            "Joining wrld_abc:1",
            "Entering Room: Next World",
            "Joining wrld_def:2",
        ],
        None,
    );
    let state = tracker.current().unwrap();
    assert_eq!(state.world_id.as_deref(), Some("wrld_def"));
    assert_eq!(state.world_name.as_deref(), Some("Next World"));
}

#[test]
fn test_world_enter_later_starts_new_transition() {
    let mut tracker = InstanceTracker::new();
    feed(
        &mut tracker,
        &[
            "Joining wrld_abc:12345",
            "OnPlayerJoined Alice (usr_111)",
            "Entering Room: Somewhere Else",
        ],
        None,
    );

    let state = tracker.current().unwrap();
    assert!(state.roster.is_empty());
    assert_eq!(state.world_name.as_deref(), Some("Somewhere Else"));
    assert_eq!(state.world_id, None);
}

#[test]
fn test_instance_join_keeps_name_from_preceding_world_enter() {
    let mut tracker = InstanceTracker::new();
    feed(
        &mut tracker,
        &["Entering Room: Test World", "Joining wrld_abc:12345"],
        None,
    );
    assert_eq!(
        tracker.current().unwrap().label(),
        "Test World (wrld_abc:12345)"
    );

    // A later instance join without a fresh world enter drops the stale name.
    tracker.handle(&event("OnPlayerJoined Alice (usr_111)"), None, now());
    tracker.handle(&event("Joining wrld_def:9"), None, now());
    assert_eq!(tracker.current().unwrap().world_name, None);
}

// ─── Roster membership ──────────────────────────────────────────────────────

#[test]
fn test_local_user_is_never_detected() {
    let mut tracker = InstanceTracker::new();
    let outcomes = feed(
        &mut tracker,
        &["Joining wrld_abc:1", "OnPlayerJoined Me (usr_self)"],
        Some("usr_self"),
    );

    assert!(detections(&outcomes).is_empty());
    assert_eq!(
        outcomes[1],
        TrackOutcome::LocalUserSeen {
            user_id: "usr_self".to_string()
        }
    );
    assert_eq!(
        tracker.current().unwrap().player("usr_self").unwrap().invite_status,
        InviteStatus::Skipped
    );
}

#[test]
fn test_leave_flags_entry_and_rejoin_is_not_redetected() {
    let mut tracker = InstanceTracker::new();
    let outcomes = feed(
        &mut tracker,
        &[
            "Joining wrld_abc:1",
            "OnPlayerJoined Alice (usr_111)",
            "OnPlayerLeft Alice (usr_111)",
        ],
        None,
    );
    assert!(matches!(outcomes[2], TrackOutcome::PlayerLeft { .. }));

    let state = tracker.current().unwrap();
    let alice = state.player("usr_111").unwrap();
    assert!(!alice.present);
    assert_eq!(state.present_count(), 0);

    let rejoin = tracker.handle(&event("OnPlayerJoined Alice (usr_111)"), None, now());
    assert_eq!(rejoin, TrackOutcome::Ignored);
    assert!(tracker.current().unwrap().player("usr_111").unwrap().present);
}

#[test]
fn test_leave_of_unknown_player_is_ignored() {
    let mut tracker = InstanceTracker::new();
    tracker.handle(&event("Joining wrld_abc:1"), None, now());
    let outcome = tracker.handle(&event("OnPlayerLeft Ghost (usr_999)"), None, now());
    assert_eq!(outcome, TrackOutcome::Ignored);
}

#[test]
fn test_log_timestamp_is_kept_on_player() {
    let mut tracker = InstanceTracker::new();
    feed(
        &mut tracker,
        &[
            "2024.01.15 20:31:01 Log        -  [Behaviour] Joining wrld_abc:1",
            "2024.01.15 20:31:05 Log        -  [Behaviour] OnPlayerJoined Alice (usr_111)",
        ],
        None,
    );
    let alice = tracker.current().unwrap().player("usr_111").unwrap();
    assert_eq!(
        alice.joined_at_log.map(|t| t.format("%H:%M:%S").to_string()),
        Some("20:31:05".to_string())
    );
}

// ─── Status feedback ────────────────────────────────────────────────────────

#[test]
fn test_status_updates_apply_to_current_generation_only() {
    let mut tracker = InstanceTracker::new();
    feed(
        &mut tracker,
        &["Joining wrld_abc:1", "OnPlayerJoined Alice (usr_111)"],
        None,
    );
    let generation = tracker.generation();

    let queued = StatusUpdate {
        generation,
        user_id: "usr_111".to_string(),
        status: InviteStatus::Queued,
    };
    assert!(tracker.apply_status(&queued));

    let invited = StatusUpdate {
        status: InviteStatus::Invited,
        ..queued.clone()
    };
    assert!(tracker.apply_status(&invited));
    assert_eq!(
        tracker.current().unwrap().count_with_status(InviteStatus::Invited),
        1
    );

    // Final statuses stick.
    assert!(!tracker.apply_status(&queued));

    // Outcomes for a left instance are discarded.
    tracker.handle(&event("Joining wrld_abc:2"), None, now());
    tracker.handle(&event("OnPlayerJoined Alice (usr_111)"), None, now());
    let stale = StatusUpdate {
        generation,
        user_id: "usr_111".to_string(),
        status: InviteStatus::Skipped,
    };
    assert!(!tracker.apply_status(&stale));
    assert_eq!(
        tracker.current().unwrap().player("usr_111").unwrap().invite_status,
        InviteStatus::Pending
    );
}
