//! Tracing setup for binaries and harnesses embedding the engine. The
//! library itself only emits events; installing a subscriber is the
//! host's call.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the background file writer alive; dropping it flushes and stops
/// file output.
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Install the global subscriber: stdout always, plus a daily-rolling
/// `hifz-engine.log` under `file_dir` when one is given. `RUST_LOG`
/// overrides `default_filter`.
pub fn init_tracing(default_filter: &str, file_dir: Option<&Path>) -> Option<LogGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let stdout_layer = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let Some(dir) = file_dir else {
        registry.init();
        return None;
    };

    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("failed to create log directory {}: {err}", dir.display());
        registry.init();
        return None;
    }

    let appender = RollingFileAppender::new(Rotation::DAILY, dir, "hifz-engine.log");
    let (writer, worker) = tracing_appender::non_blocking(appender);
    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
    registry.with(file_layer).init();
    Some(LogGuard { _worker: worker })
}
