use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use autoinvite_types::formatting::format_duration;

use crate::api::LoginGrant;

/// The single authenticated session. Only [`SessionManager`](super::SessionManager)
/// creates or mutates one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub display_name: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_validated_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn from_grant(grant: LoginGrant, lifetime: Duration, now: DateTime<Utc>) -> Self {
        let lifetime = TimeDelta::from_std(lifetime).unwrap_or(TimeDelta::days(1));
        Self {
            token: grant.token,
            user_id: grant.user_id,
            display_name: grant.display_name,
            issued_at: now,
            expires_at: now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC),
            last_validated_at: Some(now),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            token: self.token.clone(),
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            expires_at: self.expires_at,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("last_validated_at", &self.last_validated_at)
            .finish_non_exhaustive()
    }
}

/// Read-only copy of the session handed to the worker and API clients.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub token: String,
    pub user_id: String,
    pub display_name: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Published on a watch channel; the invite worker gates dispatch on it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Missing,
    Active(SessionSnapshot),
    Invalidated { reason: String },
}

impl SessionStatus {
    /// The session, if dispatch may use it at `now`.
    pub fn usable(&self, now: DateTime<Utc>) -> Option<&SessionSnapshot> {
        match self {
            Self::Active(snapshot) if !snapshot.is_expired(now) => Some(snapshot),
            _ => None,
        }
    }

    /// Account of the local user, used to keep it out of the invite targets.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Active(snapshot) => Some(&snapshot.user_id),
            _ => None,
        }
    }

    pub fn describe(&self, now: DateTime<Utc>) -> String {
        match self {
            Self::Missing => "no session".to_string(),
            Self::Invalidated { reason } => format!("invalid ({reason})"),
            Self::Active(s) if s.is_expired(now) => "expired".to_string(),
            Self::Active(s) => {
                let who = s.display_name.as_deref().unwrap_or(&s.user_id);
                format!(
                    "valid as {who}, expires in {}",
                    format_duration((s.expires_at - now).to_std().unwrap_or_default())
                )
            }
        }
    }
}
