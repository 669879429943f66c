pub mod batch;
pub mod batcher;

pub use batch::{NotificationRecord, NotifiedPlayer, RecordType, WebhookBatch};
pub use batcher::{NotificationBatcher, Notifier};
