//! Collaborator seams
//!
//! The monitor talks to the outside world only through these traits, so the
//! loops can be driven by scripted fakes in tests and by the HTTP clients in
//! [`vrchat`] and [`webhook_http`] in production.

pub mod vrchat;
pub mod webhook_http;

use std::fmt;

use async_trait::async_trait;

use crate::error::{AuthError, WebhookError};
use crate::session::SessionSnapshot;
use crate::webhook::NotificationRecord;

pub use vrchat::VrchatClient;
pub use webhook_http::JsonWebhook;

/// Result of one invite attempt. Both failure classes are expected, so this
/// is a value rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteOutcome {
    Success,
    /// Network failure, remote throttling or server error. Worth retrying.
    Transient(String),
    /// Already invited, blocked, or invalid target. Never retried.
    Permanent(String),
}

/// Answer of the auth check for an existing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid(String),
}

/// What a successful login hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub token: String,
    pub user_id: String,
    pub display_name: Option<String>,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait InviteApi: Send + Sync {
    async fn invite(&self, session: &SessionSnapshot, user_id: &str) -> InviteOutcome;
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn validate(&self, session: &SessionSnapshot) -> Result<Validation, AuthError>;
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, AuthError>;
}

#[async_trait]
pub trait WebhookClient: Send + Sync {
    async fn send(&self, batch: &[NotificationRecord]) -> Result<(), WebhookError>;
}
