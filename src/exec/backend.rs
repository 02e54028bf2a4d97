// src/exec/backend.rs

//! Pluggable container engine abstraction.
//!
//! The coordinator talks to a `ContainerEngine` instead of spawning processes
//! itself. Production uses [`super::compose::ComposeEngine`]; tests provide a
//! fake that records calls and scripts failures.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::errors::{DockwatchError, Result};
use crate::types::EngineOp;

/// Boxed future returned by every engine operation.
pub type EngineFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Imperative operations on one named service.
///
/// Each call resolves once the operation has finished, with coarse
/// success/failure only.
pub trait ContainerEngine: Send + Sync {
    fn build<'a>(&'a self, service: &'a str) -> EngineFuture<'a>;
    fn start<'a>(&'a self, service: &'a str) -> EngineFuture<'a>;
    fn stop<'a>(&'a self, service: &'a str) -> EngineFuture<'a>;
    fn restart<'a>(&'a self, service: &'a str) -> EngineFuture<'a>;

    /// Follow the service's logs, sending each line on `lines`.
    ///
    /// Resolves when the stream ends. Dropping the future cancels the
    /// session.
    fn stream_logs<'a>(
        &'a self,
        service: &'a str,
        tail: u32,
        lines: mpsc::Sender<String>,
    ) -> EngineFuture<'a>;

    /// Dispatch a lifecycle operation by name.
    ///
    /// `Logs` is not a lifecycle step and resolves to an engine failure.
    fn run<'a>(&'a self, op: EngineOp, service: &'a str) -> EngineFuture<'a> {
        match op {
            EngineOp::Build => self.build(service),
            EngineOp::Start => self.start(service),
            EngineOp::Stop => self.stop(service),
            EngineOp::Restart => self.restart(service),
            EngineOp::Logs => Box::pin(async move {
                Err(DockwatchError::engine(
                    EngineOp::Logs,
                    service,
                    "log streaming is not a lifecycle step; use stream_logs",
                ))
            }),
        }
    }
}
