use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Spawned loops plus the tokens that stop them.
///
/// Producers (pipeline, worker, session timer) stop first. Flushers (the
/// notification batcher) stop after every producer has finished, so the
/// outcome of a send that was in flight still gets delivered.
pub struct BackgroundTasks {
    cancel: CancellationToken,
    flush_cancel: CancellationToken,
    producers: Vec<(&'static str, JoinHandle<()>)>,
    flushers: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            flush_cancel: CancellationToken::new(),
            producers: Vec::new(),
            flushers: Vec::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn flush_token(&self) -> CancellationToken {
        self.flush_cancel.clone()
    }

    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.producers.push((name, tokio::spawn(fut)));
    }

    pub fn spawn_flusher<F>(&mut self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.flushers.push((name, tokio::spawn(fut)));
    }

    /// Stop everything and wait for each task to wind down.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        join_all(self.producers).await;
        self.flush_cancel.cancel();
        join_all(self.flushers).await;
    }
}

async fn join_all(tasks: Vec<(&'static str, JoinHandle<()>)>) {
    for (name, handle) in tasks {
        match handle.await {
            Ok(()) => debug!(task = name, "Task finished"),
            Err(e) => error!(task = name, error = %e, "Task ended abnormally"),
        }
    }
}
