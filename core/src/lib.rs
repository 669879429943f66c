pub mod api;
pub mod context;
pub mod error;
pub mod events;
pub mod game_log;
pub mod history;
pub mod invite;
pub mod session;
pub mod state;
pub mod webhook;

mod timer;

// Re-exports for convenience
pub use context::{AppConfig, AppConfigExt, MonitorDeps, MonitorHandle, MonitorStatus, start_monitor};
pub use events::{EventKind, MonitorEvent};
pub use game_log::{FilePattern, StartPosition, TailerConfig};
pub use state::InviteStatus;
