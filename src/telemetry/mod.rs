//! Tracing initialisation and structured conversation events.

pub mod events;

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

pub fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false);
    let subscriber = Registry::default().with(env_filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber).context("failed to set global subscriber")
}

/// Console output plus a daily-rolling JSON log under `dir`. Keep the guard
/// alive for the lifetime of the process or buffered lines are lost.
pub fn init_tracing_with_file(dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::daily(dir, "voicetriage.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false);
    let file_layer = fmt::layer().json().with_ansi(false).with_writer(writer);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set global subscriber")?;
    Ok(guard)
}
