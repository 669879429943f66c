//! VRChat HTTP client
//!
//! Invites go out as group invites; authentication uses the `auth` cookie the
//! login endpoint sets. Accounts with two-factor authentication enabled are
//! rejected at login.

use async_trait::async_trait;
use reqwest::header::{COOKIE, HeaderMap, SET_COOKIE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use autoinvite_types::ApiSettings;

use super::{AuthApi, Credentials, InviteApi, InviteOutcome, LoginGrant, Validation};
use crate::error::AuthError;
use crate::session::SessionSnapshot;

/// Longest response body kept in error messages.
const BODY_EXCERPT: usize = 200;

/// Subset of the `/auth/user` response we care about.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentUser {
    id: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    requires_two_factor_auth: Vec<String>,
}

pub struct VrchatClient {
    http: Client,
    base_url: String,
    group_id: String,
}

impl VrchatClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            group_id: settings.group_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl InviteApi for VrchatClient {
    async fn invite(&self, session: &SessionSnapshot, user_id: &str) -> InviteOutcome {
        if self.group_id.is_empty() {
            return InviteOutcome::Permanent("no group configured".to_string());
        }

        let response = self
            .http
            .post(self.url(&format!("groups/{}/invites", self.group_id)))
            .header(COOKIE, auth_cookie_header(&session.token))
            .json(&serde_json::json!({ "userId": user_id }))
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                debug!(user_id, status = status.as_u16(), "Invite response");
                classify_invite_status(status, &body)
            }
            Err(e) => InviteOutcome::Transient(format!("request failed: {e}")),
        }
    }
}

#[async_trait]
impl AuthApi for VrchatClient {
    async fn validate(&self, session: &SessionSnapshot) -> Result<Validation, AuthError> {
        let resp = self
            .http
            .get(self.url("auth/user"))
            .header(COOKIE, auth_cookie_header(&session.token))
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(Validation::Invalid("session rejected".to_string()));
        }
        if !status.is_success() {
            return Err(AuthError::Status {
                status: status.as_u16(),
                body: excerpt(&resp.text().await.unwrap_or_default()),
            });
        }

        let user: CurrentUser = resp.json().await?;
        if !user.requires_two_factor_auth.is_empty() {
            return Ok(Validation::Invalid(
                "session awaits two-factor verification".to_string(),
            ));
        }
        match user.id {
            Some(id) if id == session.user_id => Ok(Validation::Valid),
            Some(id) => Ok(Validation::Invalid(format!(
                "session belongs to {id}, expected {}",
                session.user_id
            ))),
            None => Ok(Validation::Invalid("no user behind session".to_string())),
        }
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, AuthError> {
        let resp = self
            .http
            .get(self.url("auth/user"))
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(AuthError::Status {
                status: status.as_u16(),
                body: excerpt(&resp.text().await.unwrap_or_default()),
            });
        }

        let token = auth_token_from_headers(resp.headers());
        let user: CurrentUser = resp.json().await?;
        if !user.requires_two_factor_auth.is_empty() {
            return Err(AuthError::TwoFactorRequired);
        }

        let token = token.ok_or(AuthError::MissingToken)?;
        let user_id = user.id.ok_or(AuthError::MissingToken)?;
        Ok(LoginGrant {
            token,
            user_id,
            display_name: user.display_name,
        })
    }
}

fn auth_cookie_header(token: &str) -> String {
    format!("auth={token}")
}

/// Extract the `auth` cookie value from `Set-Cookie` headers.
fn auth_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.trim().strip_prefix("auth="))
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

/// Map an invite response status onto the retry policy.
///
/// 429, 5xx and 401 are transient: the first two clear by themselves and a
/// rejected session is caught by the next validation. Other 4xx answers
/// (already invited, blocked, unknown user) are permanent.
pub fn classify_invite_status(status: StatusCode, body: &str) -> InviteOutcome {
    let code = status.as_u16();
    match code {
        200..=299 => InviteOutcome::Success,
        401 => InviteOutcome::Transient("session rejected".to_string()),
        429 => InviteOutcome::Transient("rate limited by remote".to_string()),
        500..=599 => InviteOutcome::Transient(format!("server error {code}")),
        400 => InviteOutcome::Permanent(reason_or(body, "already invited or invalid request")),
        403 => InviteOutcome::Permanent(reason_or(body, "not allowed to invite this user")),
        404 => InviteOutcome::Permanent(reason_or(body, "unknown user")),
        400..=499 => InviteOutcome::Permanent(format!("rejected with {code}")),
        _ => InviteOutcome::Transient(format!("unexpected status {code}")),
    }
}

/// Prefer the API's own `error.message` when the body carries one.
fn reason_or(body: &str, fallback: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(|m| m.trim_matches('"').to_string())
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT).collect()
}
