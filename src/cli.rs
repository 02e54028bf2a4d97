// src/cli.rs

//! Command-line flags. Anything set here wins over `Dockwatch.toml`.

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Parser)]
#[command(name = "dockwatch", version)]
#[command(about = "Restart or rebuild a compose service when its source files change.")]
pub struct CliArgs {
    /// Config file to load.
    #[arg(short = 'c', long, value_name = "PATH", default_value = "Dockwatch.toml")]
    pub config: String,

    /// Compose service to manage (overrides `[service].name`).
    #[arg(short = 's', long, value_name = "NAME")]
    pub service: Option<String>,

    /// Answer "yes" to every rebuild prompt.
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Never attach to the container's log output.
    #[arg(long)]
    pub no_logs: bool,

    /// Verbosity; falls back to `DOCKWATCH_LOG`, then `info`.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the resolved settings and tracked files, then exit.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
