//! Persisted configuration
//!
//! The settings structs live in `autoinvite-types`; this extension trait adds
//! loading and saving through confy (TOML in the platform config directory).

use std::path::{Path, PathBuf};

use tracing::warn;

pub use autoinvite_types::AppConfig;

use crate::error::ConfigError;

const APP_NAME: &str = "autoinvite";
const CONFIG_NAME: &str = "config";

pub trait AppConfigExt: Sized {
    /// Load the stored config, falling back to defaults if it cannot be read.
    fn load() -> Self;
    fn try_load() -> Result<Self, ConfigError>;
    fn save(&self) -> Result<(), ConfigError>;
    fn config_path() -> Result<PathBuf, ConfigError>;
    fn load_from(path: &Path) -> Result<Self, ConfigError>;
    fn save_to(&self, path: &Path) -> Result<(), ConfigError>;
    fn to_toml(&self) -> Result<String, ConfigError>;
}

impl AppConfigExt for AppConfig {
    fn load() -> Self {
        Self::try_load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    fn try_load() -> Result<Self, ConfigError> {
        Ok(confy::load(APP_NAME, CONFIG_NAME)?)
    }

    fn save(&self) -> Result<(), ConfigError> {
        Ok(confy::store(APP_NAME, CONFIG_NAME, self)?)
    }

    fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)?)
    }

    fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Ok(confy::load_path(path)?)
    }

    fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        Ok(confy::store_path(path, self)?)
    }

    fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
