//! Tracing setup for the binary.
//!
//! Everything at the filter level goes to a rolling file in the data
//! directory; only warnings and errors reach stderr so they don't bury the
//! console.

use std::path::Path;

use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

const LOG_FILE: &str = "autoinvite.log";
const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;

/// Install the global subscriber. Keep the returned guard alive for the life
/// of the process or buffered file output is lost.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    fn stderr_layer<S>() -> impl Layer<S>
    where
        S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(LevelFilter::WARN)
    }

    let appender = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        BasicRollingFileAppender::new(
            dir.join(LOG_FILE),
            RollingConditionBasic::new().daily().max_size(MAX_LOG_SIZE),
            MAX_LOG_FILES,
        )
        .ok()
    });

    match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(file)
                .with(stderr_layer())
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr_layer()).init();
            None
        }
    }
}
