//! Tracing setup: stderr always, plus a daily event log file when enabled.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// File name prefix of the event log.
pub const EVENT_LOG: &str = "events.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
///
/// The returned guard keeps the event log writer flushing; hold it until exit.
#[must_use]
pub fn init(event_log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match event_log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, EVENT_LOG);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_ansi(false).with_writer(writer);
            tracing_subscriber::registry()
                .with(env_filter())
                .with(stderr)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(stderr)
                .init();
            None
        }
    }
}
