// src/engine/log_stream.rs

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::exec::ContainerEngine;

/// Tracing target for container output.
pub const CONTAINER_LOG_TARGET: &str = "dockwatch::container";

/// How long `stop` waits for the session task after cancelling it.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct ActiveSession {
    id: u64,
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct GuardState {
    next_id: u64,
    active: Option<ActiveSession>,
}

/// Owns at most one log-tail session for the service.
///
/// `start` while a session is live is a no-op. The session ends on its own
/// when the engine's stream ends, or via [`LogStreamGuard::stop`].
#[derive(Clone)]
pub struct LogStreamGuard {
    engine: Arc<dyn ContainerEngine>,
    service: String,
    tail: u32,
    state: Arc<Mutex<GuardState>>,
}

impl std::fmt::Debug for LogStreamGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStreamGuard")
            .field("service", &self.service)
            .field("tail", &self.tail)
            .finish_non_exhaustive()
    }
}

fn lock(state: &Mutex<GuardState>) -> MutexGuard<'_, GuardState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LogStreamGuard {
    pub fn new(engine: Arc<dyn ContainerEngine>, service: impl Into<String>, tail: u32) -> Self {
        Self {
            engine,
            service: service.into(),
            tail,
            state: Arc::new(Mutex::new(GuardState::default())),
        }
    }

    /// Whether a session is currently running.
    pub fn is_active(&self) -> bool {
        lock(&self.state)
            .active
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Start a tail session unless one is already running.
    ///
    /// Returns `true` if a new session was started.
    pub fn start(&self) -> bool {
        let mut state = lock(&self.state);
        if let Some(active) = state.active.as_ref() {
            if !active.handle.is_finished() {
                debug!(service = %self.service, "log stream already active");
                return false;
            }
        }

        state.next_id += 1;
        let id = state.next_id;
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let engine = Arc::clone(&self.engine);
        let service = self.service.clone();
        let tail = self.tail;
        let shared = Arc::clone(&self.state);

        let handle = tokio::spawn(async move {
            run_session(engine, &service, tail, cancel_rx).await;

            let mut state = lock(&shared);
            if state.active.as_ref().is_some_and(|s| s.id == id) {
                state.active = None;
            }
        });

        info!(service = %self.service, "log stream started");
        state.active = Some(ActiveSession {
            id,
            cancel: cancel_tx,
            handle,
        });
        true
    }

    /// Cancel the running session, if any, and wait for it to end.
    pub async fn stop(&self) {
        let Some(active) = lock(&self.state).active.take() else {
            return;
        };

        let _ = active.cancel.send(());
        let mut handle = active.handle;
        if tokio::time::timeout(STOP_TIMEOUT, &mut handle).await.is_err() {
            warn!(service = %self.service, "log stream did not stop in time; aborting");
            handle.abort();
        }
    }
}

async fn run_session(
    engine: Arc<dyn ContainerEngine>,
    service: &str,
    tail: u32,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let (lines_tx, mut lines_rx) = mpsc::channel::<String>(256);
    let mut stream = engine.stream_logs(service, tail, lines_tx);

    loop {
        tokio::select! {
            _ = &mut cancel_rx => {
                debug!(service = %service, "log stream cancelled");
                break;
            }
            res = &mut stream => {
                while let Ok(line) = lines_rx.try_recv() {
                    emit(service, &line);
                }
                match res {
                    Ok(()) => info!(service = %service, "log stream ended"),
                    Err(err) => warn!(service = %service, error = %err, "log stream failed"),
                }
                break;
            }
            Some(line) = lines_rx.recv() => emit(service, &line),
        }
    }
}

fn emit(service: &str, line: &str) {
    info!(target: CONTAINER_LOG_TARGET, service = %service, "{}", line);
}
