//! Session lifecycle
//!
//! Owns the one active [`Session`]: restores it from the encrypted store,
//! re-validates it periodically, expires it unconditionally after its
//! lifetime, and publishes every change on a watch channel that gates the
//! invite worker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use autoinvite_types::SessionSettings;

use super::model::{Session, SessionSnapshot, SessionStatus};
use super::store::SessionStore;
use crate::api::{AuthApi, Credentials, Validation};
use crate::error::AuthError;
use crate::events::{EventKind, EventSink};
use crate::timer::{deadline_after, sleep_until_opt};

pub struct SessionManager {
    auth: Arc<dyn AuthApi>,
    store: Option<SessionStore>,
    settings: SessionSettings,
    events: EventSink,
    session: Option<Session>,
    status_tx: watch::Sender<SessionStatus>,
}

impl SessionManager {
    /// `store` of `None` keeps the session in memory only.
    pub fn new(
        auth: Arc<dyn AuthApi>,
        store: Option<SessionStore>,
        settings: SessionSettings,
        events: EventSink,
    ) -> (Self, watch::Receiver<SessionStatus>) {
        let (status_tx, status_rx) = watch::channel(SessionStatus::Missing);
        (
            Self {
                auth,
                store,
                settings,
                events,
                session: None,
                status_tx,
            },
            status_rx,
        )
    }

    pub fn status(&self) -> SessionStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Load the persisted session. Unreadable or expired material counts as
    /// no session; returns whether one is now active.
    pub fn restore(&mut self, now: DateTime<Utc>) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.load() {
            Ok(Some(session)) if session.is_expired(now) => {
                info!(user_id = %session.user_id, "Stored session has expired");
                if let Err(e) = store.clear() {
                    warn!(error = %e, "Failed to remove expired session");
                }
                false
            }
            Ok(Some(session)) => {
                self.events.emit(
                    EventKind::Auth,
                    format!("restored session for {}", session.user_id),
                );
                self.activate(session);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Stored session unreadable, login required");
                self.events
                    .emit(EventKind::Auth, format!("stored session unreadable: {e}"));
                false
            }
        }
    }

    /// Run the login flow and make the resulting session active.
    pub async fn login(
        &mut self,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<SessionSnapshot, AuthError> {
        let grant = match self.auth.login(credentials).await {
            Ok(grant) => grant,
            Err(e) => {
                self.events.emit(EventKind::Auth, format!("login failed: {e}"));
                return Err(e);
            }
        };
        let session = Session::from_grant(grant, self.settings.duration(), now);
        let snapshot = session.snapshot();
        self.persist(&session);
        self.events.emit(
            EventKind::Auth,
            format!("logged in as {}", session.display_name.as_deref().unwrap_or(&session.user_id)),
        );
        self.activate(session);
        Ok(snapshot)
    }

    /// Check the active session now. Transport errors keep it; only an explicit
    /// rejection or expiry invalidates it.
    pub async fn validate_now(&mut self, now: DateTime<Utc>) -> SessionStatus {
        // A login from another process may have produced a session since.
        if self.session.is_none() && !self.restore(now) {
            return self.status();
        }
        let Some(session) = self.session.as_ref() else {
            return self.status();
        };
        if session.is_expired(now) {
            self.invalidate("session expired");
            return self.status();
        }

        let snapshot = session.snapshot();
        match self.auth.validate(&snapshot).await {
            Ok(Validation::Valid) => {
                debug!(user_id = %snapshot.user_id, "Session validated");
                if let Some(session) = self.session.as_mut() {
                    session.last_validated_at = Some(now);
                }
                if let Some(session) = self.session.clone() {
                    self.persist(&session);
                }
            }
            Ok(Validation::Invalid(reason)) => self.invalidate(&reason),
            Err(e) => {
                error!(error = %e, "Session validation failed, keeping current session");
                self.events
                    .emit(EventKind::Error, format!("session validation failed: {e}"));
            }
        }
        self.status()
    }

    /// Drop the active session and block dispatch until a new login.
    pub fn invalidate(&mut self, reason: &str) {
        if self.session.take().is_none() {
            return;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!(error = %e, "Failed to remove invalid session");
            }
        }
        self.events
            .emit(EventKind::Auth, format!("session invalidated: {reason}"));
        self.status_tx.send_replace(SessionStatus::Invalidated {
            reason: reason.to_string(),
        });
    }

    /// Forget the session locally and on disk.
    pub fn logout(&mut self) {
        self.session = None;
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!(error = %e, "Failed to remove stored session");
            }
        }
        self.status_tx.send_replace(SessionStatus::Missing);
    }

    /// Validation timer: re-validates every `validation_interval` and expires
    /// the session at its deadline. Stops on `cancel`.
    pub async fn run(mut self, cancel: CancellationToken) {
        let period = self.settings.validation_interval().max(Duration::from_secs(1));
        let mut ticker = interval_at(deadline_after(Instant::now(), period), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.validate_now(Utc::now()).await;

        loop {
            let expiry = self.expiry_deadline();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep_until_opt(expiry) => self.invalidate("session expired"),
                _ = ticker.tick() => {
                    self.validate_now(Utc::now()).await;
                }
            }
        }
        debug!("Session manager stopped");
    }

    fn expiry_deadline(&self) -> Option<Instant> {
        let session = self.session.as_ref()?;
        let remaining = (session.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        Some(deadline_after(Instant::now(), remaining))
    }

    fn activate(&mut self, session: Session) {
        let snapshot = session.snapshot();
        self.session = Some(session);
        self.status_tx.send_replace(SessionStatus::Active(snapshot));
    }

    fn persist(&self, session: &Session) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(session) {
            warn!(error = %e, "Failed to persist session");
            self.events
                .emit(EventKind::Error, format!("could not save session: {e}"));
        }
    }
}
