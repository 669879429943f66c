use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use autoinvite_core::api::{Credentials, JsonWebhook, VrchatClient, WebhookClient};
use autoinvite_core::context::data_dir;
use autoinvite_core::events::EventSink;
use autoinvite_core::game_log::resolve_log_directory;
use autoinvite_core::history::{InviteHistory, JsonlHistory, MemoryHistory};
use autoinvite_core::session::{SessionManager, SessionStore};
use autoinvite_core::{AppConfig, AppConfigExt, MonitorDeps, MonitorStatus};
use autoinvite_types::formatting::{format_count, format_remaining};

use crate::readline;

/// Command-line override first, then the config, then the platform default.
pub fn log_directory(config: &AppConfig, override_dir: Option<PathBuf>) -> Result<PathBuf, String> {
    override_dir
        .or_else(|| resolve_log_directory(&config.log.log_directory))
        .ok_or_else(|| {
            let path = AppConfig::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "the config file".to_string());
            format!("no log directory known for this platform; set log.log_directory in {path} or pass --log-dir")
        })
}

/// Build the HTTP collaborators and on-disk stores from the config.
pub fn build_deps(config: &AppConfig) -> Result<MonitorDeps, String> {
    if config.api.group_id.trim().is_empty() {
        warn!("No group configured, every invite will be skipped");
    }
    let client = Arc::new(VrchatClient::new(&config.api).map_err(|e| e.to_string())?);

    let webhook: Option<Arc<dyn WebhookClient>> = match config.webhook.url.as_deref() {
        Some(url) if !url.trim().is_empty() => Some(Arc::new(
            JsonWebhook::new(url, &config.api.user_agent).map_err(|e| e.to_string())?,
        )),
        _ => None,
    };

    let history: Arc<dyn InviteHistory> = match data_dir() {
        Some(dir) => Arc::new(JsonlHistory::in_dir(&dir)),
        None => {
            warn!("No data directory, invite history kept in memory only");
            Arc::new(MemoryHistory::new())
        }
    };

    let session_store = match SessionStore::in_data_dir() {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, "Session will not be persisted");
            None
        }
    };

    Ok(MonitorDeps {
        invite_api: client.clone(),
        auth_api: client,
        webhook,
        history,
        session_store,
    })
}

/// Shown before reading the password from a stream that echoes it.
pub const VISIBLE_PASSWORD_PROMPT: &str =
    "Password (no terminal, input will be visible; AUTOINVITE_PASSWORD avoids this):";

/// Read the password from the terminal without echo, or from stdin when
/// there is no terminal to hide it on.
pub fn prompt_password() -> Result<String, String> {
    read_password(
        || rpassword::prompt_password("Password: "),
        || {
            println!("{VISIBLE_PASSWORD_PROMPT}");
            readline()
        },
    )
}

fn read_password(
    hidden: impl FnOnce() -> io::Result<String>,
    visible: impl FnOnce() -> Result<Option<String>, String>,
) -> Result<String, String> {
    let line = match hidden() {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "Cannot read password without echo");
            visible()?.ok_or("no password given")?
        }
    };
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        return Err("no password given".to_string());
    }
    Ok(password.to_string())
}

pub async fn login(config: &AppConfig, username: String, password: String) -> Result<(), String> {
    let client = Arc::new(VrchatClient::new(&config.api).map_err(|e| e.to_string())?);
    let store = SessionStore::in_data_dir().map_err(|e| e.to_string())?;
    let (mut manager, _) = SessionManager::new(
        client,
        Some(store),
        config.session.clone(),
        EventSink::new(),
    );

    let credentials = Credentials { username, password };
    let snapshot = manager
        .login(&credentials, Utc::now())
        .await
        .map_err(|e| format!("login failed: {e}"))?;
    println!(
        "Logged in as {} ({}); session valid until {}",
        snapshot.display_name.as_deref().unwrap_or(&snapshot.user_id),
        snapshot.user_id,
        snapshot.expires_at.format("%Y-%m-%d %H:%M UTC"),
    );
    Ok(())
}

pub fn logout() -> Result<(), String> {
    let store = SessionStore::in_data_dir().map_err(|e| e.to_string())?;
    store.clear().map_err(|e| e.to_string())?;
    println!("Stored session removed");
    Ok(())
}

pub fn show_config(config: &AppConfig) -> Result<(), String> {
    let path = AppConfig::config_path().map_err(|e| e.to_string())?;
    println!("# {}", path.display());
    print!("{}", config.to_toml().map_err(|e| e.to_string())?);
    Ok(())
}

pub fn show_status(status: &MonitorStatus) {
    println!("{}", describe_status(status));
}

pub fn describe_status(status: &MonitorStatus) -> String {
    let instance = &status.instance;
    let location = instance.label.as_deref().unwrap_or("not in an instance");

    let dispatch = if status.paused_by_user {
        "paused".to_string()
    } else {
        match status.resume_in {
            Some(wait) => format!("waiting, resumes in {}", format_remaining(wait.as_secs() as i64)),
            None => "running".to_string(),
        }
    };

    [
        format!("instance: {location}"),
        format!(
            "players:  {} present, {} queued, {} invited, {} skipped, {} failed",
            instance.present, instance.queued, instance.invited, instance.skipped, instance.failed
        ),
        format!(
            "queue:    {} waiting, dispatch {dispatch}",
            format_count(status.backlog, "invite")
        ),
        format!("session:  {}", status.session.describe(Utc::now())),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoinvite_core::context::InstanceSummary;
    use autoinvite_core::session::SessionStatus;
    use std::time::Duration;

    fn status() -> MonitorStatus {
        MonitorStatus {
            backlog: 3,
            paused_by_user: false,
            resume_in: None,
            sent_in_batch: 0,
            session: SessionStatus::Missing,
            instance: InstanceSummary::default(),
        }
    }

    #[test]
    fn test_describe_status_idle() {
        let text = describe_status(&status());
        assert!(text.contains("not in an instance"));
        assert!(text.contains("3 invites waiting, dispatch running"));
    }

    #[test]
    fn test_describe_status_waiting_and_paused() {
        let mut s = status();
        s.resume_in = Some(Duration::from_secs(125));
        assert!(describe_status(&s).contains("resumes in 2:05"));

        s.paused_by_user = true;
        assert!(describe_status(&s).contains("dispatch paused"));
    }

    #[test]
    fn test_override_wins_over_config() {
        let config = AppConfig::default();
        let dir = log_directory(&config, Some(PathBuf::from("/tmp/logs"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/logs"));
    }

    #[test]
    fn test_password_read_hidden_when_terminal_available() {
        let password = read_password(
            || Ok("hunter2".to_string()),
            || panic!("visible fallback used with a terminal"),
        );
        assert_eq!(password.unwrap(), "hunter2");
    }

    #[test]
    fn test_password_falls_back_to_visible_line() {
        let no_tty = || Err(io::Error::new(io::ErrorKind::NotFound, "no tty"));
        let password = read_password(no_tty, || Ok(Some("hunter2\r\n".to_string())));
        assert_eq!(password.unwrap(), "hunter2");

        assert!(read_password(no_tty, || Ok(None)).is_err());
        assert!(read_password(no_tty, || Ok(Some("\n".to_string()))).is_err());
    }
}
