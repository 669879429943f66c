//! Instance state machine
//!
//! Consumes parsed log events in order and maintains the current instance and
//! its roster. A player seen for the first time in an instance produces a
//! [`Detection`]; everything else only updates state.

use chrono::{DateTime, Utc};

use super::instance::{InstanceState, InviteStatus, Player};
use crate::events::{Detection, StatusUpdate};
use crate::game_log::ParsedEvent;

/// What a single event did to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// No state change worth reporting (duplicate join, join with no instance).
    Ignored,
    /// Roster cleared for a new instance.
    InstanceChanged { generation: u64, label: String },
    /// A world name arrived right after the instance join and was merged in.
    WorldNamed { label: String },
    Detected(Detection),
    /// The local account joined; recorded as Skipped, never invited.
    LocalUserSeen { user_id: String },
    PlayerLeft { user_id: String, display_name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastEvent {
    WorldEnter,
    InstanceJoin,
    /// A world enter merged into the instance joined just before it. Further
    /// world enters keep merging until any other event arrives.
    WorldNamed,
    Other,
}

#[derive(Debug, Default)]
pub struct InstanceTracker {
    current: Option<InstanceState>,
    generation: u64,
    last_event: Option<LastEvent>,
}

impl InstanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current instance, `None` while no instance has been entered.
    pub fn current(&self) -> Option<&InstanceState> {
        self.current.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn handle(
        &mut self,
        event: &ParsedEvent,
        local_user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> TrackOutcome {
        let previous = self.last_event;
        match event {
            ParsedEvent::WorldEnter { world_name } => {
                let merges = matches!(
                    previous,
                    Some(LastEvent::InstanceJoin | LastEvent::WorldNamed)
                );
                match self.current.as_mut() {
                    Some(state) if merges => {
                        self.last_event = Some(LastEvent::WorldNamed);
                        state.world_name = Some(world_name.clone());
                        TrackOutcome::WorldNamed {
                            label: state.label(),
                        }
                    }
                    _ => {
                        self.last_event = Some(LastEvent::WorldEnter);
                        self.reset(
                            InstanceState {
                                world_name: Some(world_name.clone()),
                                ..Default::default()
                            },
                            now,
                        )
                    }
                }
            }
            ParsedEvent::InstanceJoin {
                world_id,
                instance_id,
                region,
            } => {
                self.last_event = Some(LastEvent::InstanceJoin);
                let world_name = match previous {
                    Some(LastEvent::WorldEnter | LastEvent::WorldNamed) => {
                        self.current.as_ref().and_then(|s| s.world_name.clone())
                    }
                    _ => None,
                };
                self.reset(
                    InstanceState {
                        world_name,
                        world_id: Some(world_id.clone()),
                        instance_id: Some(instance_id.clone()),
                        region: region.clone(),
                        ..Default::default()
                    },
                    now,
                )
            }
            ParsedEvent::PlayerJoin {
                display_name,
                user_id,
                timestamp,
            } => {
                self.last_event = Some(LastEvent::Other);
                let Some(state) = self.current.as_mut() else {
                    return TrackOutcome::Ignored;
                };

                if let Some(existing) = state.roster.get_mut(user_id) {
                    existing.present = true;
                    return TrackOutcome::Ignored;
                }

                let is_local = local_user_id == Some(user_id.as_str());
                state.roster.insert(
                    user_id.clone(),
                    Player {
                        user_id: user_id.clone(),
                        display_name: display_name.clone(),
                        first_seen_at: now,
                        joined_at_log: *timestamp,
                        present: true,
                        invite_status: if is_local {
                            InviteStatus::Skipped
                        } else {
                            InviteStatus::Pending
                        },
                    },
                );

                if is_local {
                    TrackOutcome::LocalUserSeen {
                        user_id: user_id.clone(),
                    }
                } else {
                    TrackOutcome::Detected(Detection {
                        user_id: user_id.clone(),
                        display_name: display_name.clone(),
                        generation: state.generation,
                        world_id: state.world_id.clone(),
                        instance_id: state.instance_id.clone(),
                        detected_at: now,
                    })
                }
            }
            ParsedEvent::PlayerLeave { user_id, .. } => {
                self.last_event = Some(LastEvent::Other);
                let Some(player) = self
                    .current
                    .as_mut()
                    .and_then(|s| s.roster.get_mut(user_id))
                else {
                    return TrackOutcome::Ignored;
                };
                player.present = false;
                TrackOutcome::PlayerLeft {
                    user_id: player.user_id.clone(),
                    display_name: player.display_name.clone(),
                }
            }
        }
    }

    /// Apply an invite status reported by the worker.
    ///
    /// Returns `false` when the update belongs to an instance that has since
    /// been left, names an unknown player, or would overwrite a final status.
    pub fn apply_status(&mut self, update: &StatusUpdate) -> bool {
        let Some(state) = self.current.as_mut() else {
            return false;
        };
        if state.generation != update.generation {
            return false;
        }
        let Some(player) = state.roster.get_mut(&update.user_id) else {
            return false;
        };
        if player.invite_status.is_final() {
            return false;
        }
        player.invite_status = update.status;
        true
    }

    fn reset(&mut self, mut next: InstanceState, now: DateTime<Utc>) -> TrackOutcome {
        self.generation += 1;
        next.generation = self.generation;
        next.entered_at = Some(now);
        let outcome = TrackOutcome::InstanceChanged {
            generation: next.generation,
            label: next.label(),
        };
        self.current = Some(next);
        outcome
    }
}
