mod app_config;
mod background_tasks;
mod monitor;
mod pipeline;

use std::path::PathBuf;

pub use app_config::{AppConfig, AppConfigExt};
pub use background_tasks::BackgroundTasks;
pub use monitor::{MonitorDeps, MonitorHandle, MonitorStatus, start_monitor};
pub use pipeline::{InstanceSummary, LogPipeline, PipelineLinks};

/// Per-user data directory for the session, key and history files.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("autoinvite"))
}
