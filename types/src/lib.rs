//! Shared configuration types for autoinvite.

pub mod config;
pub mod formatting;

pub use config::{
    ApiSettings, AppConfig, InviteSettings, LogSettings, SessionSettings, WebhookSettings,
};
