//! Error types for the monitor core.
//!
//! None of these are fatal to the process. Each loop logs the error, reports
//! it on the observability channel and carries on in a degraded state.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reading the log source. Retried on the next poll tick.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("log directory {0:?} does not exist")]
    DirectoryMissing(PathBuf),

    #[error("no file matching {pattern:?} in {dir:?}")]
    NoMatchingFile { dir: PathBuf, pattern: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures persisting or restoring session material.
///
/// Callers treat every variant as "no session" and force re-authentication.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session file is not valid base64")]
    Encoding(#[from] base64::DecodeError),

    #[error("session file is truncated")]
    Truncated,

    #[error("session file failed integrity check")]
    Integrity,

    #[error("session key file is malformed")]
    BadKey,

    #[error("session payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("no data directory available on this platform")]
    NoDataDir,
}

/// Failures talking to the authentication endpoint.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credentials rejected")]
    InvalidCredentials,

    #[error("account requires two-factor authentication, which is not supported")]
    TwoFactorRequired,

    #[error("login response carried no session token")]
    MissingToken,

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures delivering a notification batch. Logged and dropped.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook returned status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures appending to invite history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize history entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures loading or saving the persisted configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config store error: {0}")]
    Store(#[from] confy::ConfyError),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}
