// src/logging.rs

//! Global `tracing` subscriber.
//!
//! The level is taken from `--log-level`, then `DOCKWATCH_LOG`, then `info`.
//! Events go to stderr, keeping stdout for the rebuild prompt. With
//! `[logging].file` set they are also written, uncoloured, to a rolling file
//! that keeps at most `[logging].max_files` rotated files.

use std::fs;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::cli::LogLevel;
use crate::config::LoggingSettings;
use crate::types::LogRotation;

pub const LOG_ENV_VAR: &str = "DOCKWATCH_LOG";

/// Install the subscriber. Fails if one is already installed.
///
/// Keep the returned guard alive until exit; dropping it flushes the file
/// writer.
pub fn init_logging(
    cli_level: Option<LogLevel>,
    settings: &LoggingSettings,
) -> Result<Option<WorkerGuard>> {
    let level = cli_level.map(Level::from).unwrap_or_else(env_level);

    let (file_layer, flush_guard) = match rolling_file(settings)? {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(flush_guard)
}

fn env_level() -> Level {
    std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|s| parse_level_str(&s))
        .unwrap_or(Level::INFO)
}

/// Rolling appender for `[logging].file`, `None` when no file is set.
///
/// Rotated files are named `<file>.<date>` next to `<file>`.
pub fn rolling_file(settings: &LoggingSettings) -> Result<Option<RollingFileAppender>> {
    let Some(path) = settings.file.as_deref() else {
        return Ok(None);
    };
    let prefix = path
        .file_name()
        .with_context(|| format!("log file {:?} has no file name", path))?;
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("creating log directory {:?}", dir))?;

    let rotation = match settings.rotation {
        LogRotation::Never => Rotation::NEVER,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
    };
    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix.to_string_lossy())
        .max_log_files(settings.max_files)
        .build(dir)
        .with_context(|| format!("opening log file {:?}", path))?;
    Ok(Some(appender))
}

/// Level names accepted in `DOCKWATCH_LOG` (case-insensitive).
pub fn parse_level_str(s: &str) -> Option<Level> {
    let level = match s.trim().to_ascii_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => return None,
    };
    Some(level)
}
