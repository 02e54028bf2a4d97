// src/types.rs

use std::fmt;

use serde::Deserialize;

/// Mode for storing file hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStorageMode {
    /// Store hashes in a file (`.dockwatch/hashes` by default).
    File,
    /// Store hashes in memory only (lost on restart).
    Memory,
}

impl Default for HashStorageMode {
    fn default() -> Self {
        HashStorageMode::File
    }
}

/// How a rebuild caused by a special file is confirmed.
///
/// - `Always`: rebuild without asking.
/// - `Never`: never rebuild for special files (auxiliary files still rebuild).
/// - `Prompt`: ask on the terminal, defaulting to rebuild on timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmMode {
    Always,
    Never,
    Prompt,
}

impl Default for ConfirmMode {
    fn default() -> Self {
        ConfirmMode::Prompt
    }
}

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Hourly,
    Daily,
}

impl Default for LogRotation {
    fn default() -> Self {
        LogRotation::Daily
    }
}

/// Imperative operations the orchestrator asks of the container engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    Build,
    Start,
    Stop,
    Restart,
    Logs,
}

impl fmt::Display for EngineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineOp::Build => "build",
            EngineOp::Start => "start",
            EngineOp::Stop => "stop",
            EngineOp::Restart => "restart",
            EngineOp::Logs => "logs",
        };
        f.write_str(s)
    }
}
