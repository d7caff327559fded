//! Tracing setup: console plus the append-only log file

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// Failing to open the log file is fatal. Keep the returned guard alive for
/// the life of the process so buffered lines are flushed on exit.
pub fn init(log_file: &Path, json: bool) -> Result<WorkerGuard> {
    let dir = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = log_file
        .file_name()
        .with_context(|| format!("Log file path {} has no file name", log_file.display()))?
        .to_string_lossy()
        .into_owned();

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with((!json).then(|| fmt::layer().with_writer(std::io::stdout)))
        .with((!json).then(|| fmt::layer().with_writer(file_writer.clone()).with_ansi(false)))
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stdout)))
        .with(json.then(|| fmt::layer().json().with_writer(file_writer)))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
