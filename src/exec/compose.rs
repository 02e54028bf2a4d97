// src/exec/compose.rs

//! `docker compose` backed container engine.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::model::ServiceSettings;
use crate::errors::{DockwatchError, Result};
use crate::exec::backend::{ContainerEngine, EngineFuture};
use crate::types::EngineOp;

/// Number of trailing stderr lines kept for the failure message.
const STDERR_TAIL: usize = 5;

/// Runs `<docker_bin> compose -f <compose_file> <subcommand> <service>`.
#[derive(Debug, Clone)]
pub struct ComposeEngine {
    docker_bin: String,
    compose_file: PathBuf,
}

impl ComposeEngine {
    pub fn new(docker_bin: impl Into<String>, compose_file: impl Into<PathBuf>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            compose_file: compose_file.into(),
        }
    }

    pub fn from_settings(settings: &ServiceSettings) -> Self {
        Self::new(settings.docker_bin.clone(), settings.compose_file.clone())
    }

    /// Arguments after the docker binary for `op`.
    pub fn args(&self, op: EngineOp, service: &str, tail: u32) -> Vec<String> {
        let mut args = vec![
            "compose".to_string(),
            "-f".to_string(),
            self.compose_file.to_string_lossy().into_owned(),
        ];
        let sub: &[&str] = match op {
            EngineOp::Build => &["build"],
            EngineOp::Start => &["up", "-d"],
            EngineOp::Stop => &["stop"],
            EngineOp::Restart => &["restart"],
            EngineOp::Logs => &["logs", "-f", "--no-color", "--tail"],
        };
        args.extend(sub.iter().map(|s| s.to_string()));
        if op == EngineOp::Logs {
            args.push(tail.to_string());
        }
        args.push(service.to_string());
        args
    }

    fn command(&self, op: EngineOp, service: &str, tail: u32) -> Command {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(self.args(op, service, tail))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.compose_file.parent() {
            if !dir.as_os_str().is_empty() {
                cmd.current_dir(dir);
            }
        }
        cmd
    }

    async fn run_op(&self, op: EngineOp, service: &str) -> Result<()> {
        info!(service = %service, op = %op, "running container engine operation");

        let mut child = self
            .command(op, service, 0)
            .spawn()
            .map_err(|e| DockwatchError::engine(op, service, format!("failed to spawn: {e}")))?;

        if let Some(stdout) = child.stdout.take() {
            let service = service.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(service = %service, op = %op, "stdout: {}", line);
                }
            });
        }
        let stderr_tail = child.stderr.take().map(|stderr| {
            let service = service.to_string();
            tokio::spawn(collect_stderr(stderr, service, op))
        });

        let status = child
            .wait()
            .await
            .map_err(|e| DockwatchError::engine(op, service, format!("waiting for process: {e}")))?;

        if status.success() {
            info!(service = %service, op = %op, "container engine operation succeeded");
            return Ok(());
        }

        let tail = match stderr_tail {
            Some(handle) => handle.await.unwrap_or_default(),
            None => VecDeque::new(),
        };
        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let mut detail = format!("exit status {code}");
        if !tail.is_empty() {
            detail.push_str(": ");
            detail.push_str(&tail.into_iter().collect::<Vec<_>>().join(" | "));
        }
        Err(DockwatchError::engine(op, service, detail))
    }

    async fn follow_logs(
        &self,
        service: &str,
        tail: u32,
        lines_tx: mpsc::Sender<String>,
    ) -> Result<()> {
        let op = EngineOp::Logs;
        let mut child = self
            .command(op, service, tail)
            .spawn()
            .map_err(|e| DockwatchError::engine(op, service, format!("failed to spawn: {e}")))?;

        // Compose writes container output to stdout; its own diagnostics go
        // to stderr.
        if let Some(stderr) = child.stderr.take() {
            let service = service.to_string();
            tokio::spawn(collect_stderr(stderr, service, op));
        }

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if lines_tx.send(line).await.is_err() {
                            debug!(service = %service, "log consumer gone; ending stream");
                            return Ok(());
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(service = %service, error = %err, "error reading log stream");
                        break;
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DockwatchError::engine(op, service, format!("waiting for process: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(DockwatchError::engine(
                op,
                service,
                format!("log stream exited with {status}"),
            ))
        }
    }
}

/// Log stderr at debug and keep the last few lines.
async fn collect_stderr(
    stderr: impl AsyncRead + Unpin,
    service: String,
    op: EngineOp,
) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(service = %service, op = %op, "stderr: {}", line);
        if tail.len() == STDERR_TAIL {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail
}

impl ContainerEngine for ComposeEngine {
    fn build<'a>(&'a self, service: &'a str) -> EngineFuture<'a> {
        Box::pin(self.run_op(EngineOp::Build, service))
    }

    fn start<'a>(&'a self, service: &'a str) -> EngineFuture<'a> {
        Box::pin(self.run_op(EngineOp::Start, service))
    }

    fn stop<'a>(&'a self, service: &'a str) -> EngineFuture<'a> {
        Box::pin(self.run_op(EngineOp::Stop, service))
    }

    fn restart<'a>(&'a self, service: &'a str) -> EngineFuture<'a> {
        Box::pin(self.run_op(EngineOp::Restart, service))
    }

    fn stream_logs<'a>(
        &'a self,
        service: &'a str,
        tail: u32,
        lines: mpsc::Sender<String>,
    ) -> EngineFuture<'a> {
        Box::pin(self.follow_logs(service, tail, lines))
    }
}
