// src/engine/runtime.rs

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::engine::coordinator::{ActionOutcome, RebuildCoordinator};
use crate::engine::debounce::DebounceScheduler;
use crate::engine::{RuntimeEvent, Trigger};
use crate::watch::WatcherHandle;

/// Shutdown behaviour of the runtime.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// How long shutdown waits for an in-flight action before aborting it.
    pub shutdown_grace: Duration,
    /// Stop the service once everything else has wound down.
    pub stop_on_exit: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(30),
            stop_on_exit: false,
        }
    }
}

/// Async shell around the coordinator.
///
/// Consumes debounced triggers and runtime events. Each trigger runs on its
/// own task so the loop never waits on the container engine.
pub struct Runtime {
    coordinator: RebuildCoordinator,
    debouncer: DebounceScheduler,
    trigger_rx: mpsc::UnboundedReceiver<Trigger>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    watcher: Option<WatcherHandle>,
    actions: JoinSet<ActionOutcome>,
    options: RuntimeOptions,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("coordinator", &self.coordinator)
            .field("in_flight", &self.actions.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        coordinator: RebuildCoordinator,
        debouncer: DebounceScheduler,
        trigger_rx: mpsc::UnboundedReceiver<Trigger>,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            coordinator,
            debouncer,
            trigger_rx,
            event_rx,
            watcher: None,
            actions: JoinSet::new(),
            options,
        }
    }

    /// Keep the filesystem watcher alive until shutdown.
    pub fn with_watcher(mut self, watcher: WatcherHandle) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Main event loop. Returns after a shutdown request (or once every
    /// event sender is gone) and the shutdown sequence has completed.
    pub async fn run(mut self) {
        info!(service = %self.coordinator.service(), "dockwatch runtime started");

        loop {
            tokio::select! {
                Some(trigger) = self.trigger_rx.recv() => self.dispatch(trigger),
                Some(joined) = self.actions.join_next(), if !self.actions.is_empty() => {
                    report(joined);
                }
                event = self.event_rx.recv() => match event {
                    Some(RuntimeEvent::ShutdownRequested) => {
                        info!("shutdown requested");
                        break;
                    }
                    None => {
                        info!("runtime event channel closed; exiting");
                        break;
                    }
                },
            }
        }

        self.shutdown().await;
        info!("runtime exiting");
    }

    fn dispatch(&mut self, trigger: Trigger) {
        debug!(action = %trigger.action, paths = ?trigger.paths, "dispatching trigger");
        let coordinator = self.coordinator.clone();
        self.actions
            .spawn(async move { coordinator.execute(trigger).await });
    }

    async fn shutdown(&mut self) {
        // Dropping the handle stops notify; no new changes arrive after this.
        self.watcher.take();
        self.debouncer.cancel();

        if !self.actions.is_empty() {
            info!(
                in_flight = self.actions.len(),
                grace = ?self.options.shutdown_grace,
                "waiting for in-flight action to finish"
            );
            let actions = &mut self.actions;
            let drained = tokio::time::timeout(self.options.shutdown_grace, async {
                while let Some(joined) = actions.join_next().await {
                    report(joined);
                }
            })
            .await;

            if drained.is_err() {
                warn!("shutdown grace period elapsed; aborting in-flight action");
                self.actions.abort_all();
                while self.actions.join_next().await.is_some() {}
            }
        }

        if let Some(log_stream) = self.coordinator.log_stream() {
            log_stream.stop().await;
        }

        if self.options.stop_on_exit {
            if let Err(err) = self.coordinator.stop_service().await {
                warn!(error = %err, "service left running");
            }
        }
    }
}

fn report(joined: Result<ActionOutcome, JoinError>) {
    match joined {
        Ok(outcome) => debug!(%outcome, "action finished"),
        Err(err) if err.is_cancelled() => debug!("action task cancelled"),
        Err(err) => error!(error = %err, "action task panicked"),
    }
}
