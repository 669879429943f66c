//! Ordered line-classification rules.
//!
//! Each rule pairs a pattern with a builder that turns its captures into a
//! [`ParsedEvent`]. Rules are tried top to bottom; the first one whose
//! pattern matches decides the line.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::{Captures, Regex};

use super::event::ParsedEvent;

/// A single classification rule.
pub struct MatchRule {
    pub name: &'static str,
    pattern: Regex,
    build: fn(&Captures<'_>, Option<NaiveDateTime>) -> Option<ParsedEvent>,
}

impl MatchRule {
    fn new(
        name: &'static str,
        pattern: &str,
        build: fn(&Captures<'_>, Option<NaiveDateTime>) -> Option<ParsedEvent>,
    ) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("rule patterns are static and valid"),
            build,
        }
    }

    /// Apply the rule. `None` means the pattern did not match.
    pub fn apply(&self, line: &str, timestamp: Option<NaiveDateTime>) -> Option<ParsedEvent> {
        let caps = self.pattern.captures(line)?;
        (self.build)(&caps, timestamp)
    }
}

static RULES: LazyLock<Vec<MatchRule>> = LazyLock::new(|| {
    vec![
        MatchRule::new(
            "world-enter",
            r"Entering Room:\s*(?P<name>.+?)\s*$",
            build_world_enter,
        ),
        MatchRule::new(
            "world-create",
            r"Joining or Creating Room:\s*(?P<name>.+?)\s*$",
            build_world_enter,
        ),
        MatchRule::new(
            "instance-join",
            r"Joining\s+(?P<world>wrld_[0-9A-Za-z_-]+):(?P<instance>\S+)\s*$",
            build_instance_join,
        ),
        MatchRule::new(
            "player-join",
            r"OnPlayerJoined\s+(?P<name>.+?)\s+\((?P<user>usr_[0-9A-Za-z_-]+)\)\s*$",
            build_player_join,
        ),
        MatchRule::new(
            "player-leave",
            r"OnPlayerLeft\s+(?P<name>.+?)\s+\((?P<user>usr_[0-9A-Za-z_-]+)\)\s*$",
            build_player_leave,
        ),
    ]
});

static REGION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~region\((?P<region>[^)]+)\)").expect("static pattern"));

/// The rule table in evaluation order.
pub fn rules() -> &'static [MatchRule] {
    &RULES
}

fn build_world_enter(caps: &Captures<'_>, _: Option<NaiveDateTime>) -> Option<ParsedEvent> {
    Some(ParsedEvent::WorldEnter {
        world_name: caps.name("name")?.as_str().to_string(),
    })
}

fn build_instance_join(caps: &Captures<'_>, _: Option<NaiveDateTime>) -> Option<ParsedEvent> {
    let instance_id = caps.name("instance")?.as_str();
    let region = REGION_TAG
        .captures(instance_id)
        .and_then(|c| c.name("region"))
        .map(|m| m.as_str().to_string());

    Some(ParsedEvent::InstanceJoin {
        world_id: caps.name("world")?.as_str().to_string(),
        instance_id: instance_id.to_string(),
        region,
    })
}

fn build_player_join(caps: &Captures<'_>, timestamp: Option<NaiveDateTime>) -> Option<ParsedEvent> {
    Some(ParsedEvent::PlayerJoin {
        display_name: caps.name("name")?.as_str().to_string(),
        user_id: caps.name("user")?.as_str().to_string(),
        timestamp,
    })
}

fn build_player_leave(caps: &Captures<'_>, timestamp: Option<NaiveDateTime>) -> Option<ParsedEvent> {
    Some(ParsedEvent::PlayerLeave {
        display_name: caps.name("name")?.as_str().to_string(),
        user_id: caps.name("user")?.as_str().to_string(),
        timestamp,
    })
}
