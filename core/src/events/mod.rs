pub mod monitor_event;
pub mod signal;

pub use monitor_event::{EventKind, EventSink, MonitorEvent};
pub use signal::{Detection, StatusUpdate};
