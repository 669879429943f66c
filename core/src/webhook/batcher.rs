//! Notification batching loop
//!
//! Buffers detection and outcome records and delivers them to the webhook
//! when the batch is full or `batch_delay` after its first record, whichever
//! comes first. Delivery failures are logged and the batch is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use autoinvite_types::WebhookSettings;

use super::batch::{NotificationRecord, WebhookBatch};
use crate::api::WebhookClient;
use crate::events::{EventKind, EventSink};
use crate::timer::sleep_until_opt;

/// Records buffered between the producers and the batcher.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct DropCounter {
    total: AtomicUsize,
    /// Set while the channel stays full, so each burst warns once.
    overflowing: AtomicBool,
}

/// Producer side. Never blocks; drops records when the batcher is behind or
/// notifications are disabled.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::Sender<NotificationRecord>>,
    drops: Arc<DropCounter>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::Receiver<NotificationRecord>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let notifier = Self {
            tx: Some(tx),
            ..Self::default()
        };
        (notifier, rx)
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Records lost to a full channel since startup.
    pub fn dropped(&self) -> usize {
        self.drops.total.load(Ordering::Relaxed)
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn notify(&self, record: NotificationRecord) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(record) {
            Ok(()) => {
                if self.drops.overflowing.swap(false, Ordering::Relaxed) {
                    info!(dropped_total = self.dropped(), "Notification batcher caught up");
                }
            }
            Err(TrySendError::Full(_)) => {
                self.drops.total.fetch_add(1, Ordering::Relaxed);
                if !self.drops.overflowing.swap(true, Ordering::Relaxed) {
                    warn!(
                        capacity = CHANNEL_CAPACITY,
                        "Notification batcher is behind, dropping notifications"
                    );
                }
            }
            Err(TrySendError::Closed(_)) => debug!("Notification channel closed, record dropped"),
        }
    }
}

pub struct NotificationBatcher {
    client: Arc<dyn WebhookClient>,
    settings: WebhookSettings,
    events: EventSink,
}

impl NotificationBatcher {
    pub fn new(client: Arc<dyn WebhookClient>, settings: WebhookSettings, events: EventSink) -> Self {
        Self {
            client,
            settings,
            events,
        }
    }

    fn max_batch_size(&self) -> usize {
        self.settings.max_batch_size.max(1)
    }

    pub async fn run(self, mut rx: mpsc::Receiver<NotificationRecord>, cancel: CancellationToken) {
        let mut batch = WebhookBatch::new();
        let delay = self.settings.batch_delay();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                maybe = rx.recv() => match maybe {
                    Some(record) => {
                        batch.push(record, Instant::now());
                        if batch.len() >= self.max_batch_size() {
                            self.flush(&mut batch).await;
                        }
                    }
                    None => break,
                },
                _ = sleep_until_opt(batch.deadline(delay)) => {
                    self.flush(&mut batch).await;
                }
            }
        }

        // Final flush of everything already handed over.
        while let Ok(record) = rx.try_recv() {
            batch.push(record, Instant::now());
        }
        while !batch.is_empty() {
            self.flush(&mut batch).await;
        }
        debug!("Notification batcher stopped");
    }

    async fn flush(&self, batch: &mut WebhookBatch) {
        if batch.is_empty() {
            return;
        }
        let records = batch.take(self.max_batch_size(), Instant::now());
        match self.client.send(&records).await {
            Ok(()) => info!(count = records.len(), "Delivered notification batch"),
            Err(e) => {
                warn!(error = %e, count = records.len(), "Webhook delivery failed, dropping batch");
                self.events.emit(
                    EventKind::Error,
                    format!("webhook delivery failed ({e}), {} records dropped", records.len()),
                );
            }
        }
    }
}
