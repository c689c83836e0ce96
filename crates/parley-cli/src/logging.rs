//! Tracing setup.
//!
//! Logs go to stderr, filtered by `RUST_LOG` or the configured level. With
//! `logging.file` set they are also written to a daily rolling file under the
//! logs directory.

use anyhow::{Context, Result};
use parley_core::config::LoggingConfig;
use parley_infrastructure::{ParleyPaths, ServiceType};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber.
///
/// The returned guard flushes the log file when dropped; keep it alive for
/// the whole run.
pub fn init(config: &LoggingConfig, paths: &ParleyPaths) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = if config.file {
        let dir = paths
            .get_path(ServiceType::Logs)
            .context("Failed to resolve logs directory")?;
        let appender = tracing_appender::rolling::daily(dir, "parley.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_writer(writer).with_ansi(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
