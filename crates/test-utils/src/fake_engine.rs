use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};

use dockwatch::errors::{DockwatchError, Result};
use dockwatch::exec::{ContainerEngine, EngineFuture};
use dockwatch::types::EngineOp;

#[derive(Default)]
struct Script {
    fail_next: HashMap<EngineOp, usize>,
    fail_always: HashSet<EngineOp>,
    gates: HashMap<EngineOp, Arc<Semaphore>>,
    log_lines: Vec<String>,
    logs_stay_open: bool,
}

/// A fake container engine that:
/// - records every operation it was asked to perform
/// - fails operations on demand
/// - can hold an operation "in progress" until the test releases it
/// - serves scripted log lines and counts live log sessions.
#[derive(Clone, Default)]
pub struct FakeEngine {
    calls: Arc<Mutex<Vec<EngineOp>>>,
    script: Arc<Mutex<Script>>,
    live_log_sessions: Arc<AtomicUsize>,
}

struct SessionCount(Arc<AtomicUsize>);

impl Drop for SessionCount {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<EngineOp> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: EngineOp) -> usize {
        self.calls().iter().filter(|c| **c == op).count()
    }

    /// Make the next call of `op` fail.
    pub fn fail_next(&self, op: EngineOp) {
        *self.script.lock().unwrap().fail_next.entry(op).or_default() += 1;
    }

    /// Make every call of `op` fail (or succeed again).
    pub fn set_failing(&self, op: EngineOp, failing: bool) {
        let mut script = self.script.lock().unwrap();
        if failing {
            script.fail_always.insert(op);
        } else {
            script.fail_always.remove(&op);
        }
    }

    /// Hold calls of `op` until [`FakeEngine::release`] is called.
    pub fn hold(&self, op: EngineOp) {
        self.script
            .lock()
            .unwrap()
            .gates
            .insert(op, Arc::new(Semaphore::new(0)));
    }

    /// Let one held call of `op` proceed.
    pub fn release(&self, op: EngineOp) {
        if let Some(gate) = self.script.lock().unwrap().gates.get(&op) {
            gate.add_permits(1);
        }
    }

    /// Lines every log session emits before it ends (or idles).
    pub fn set_log_lines(&self, lines: &[&str]) {
        self.script.lock().unwrap().log_lines = lines.iter().map(|s| s.to_string()).collect();
    }

    /// Keep log sessions open after the scripted lines.
    pub fn keep_logs_open(&self, open: bool) {
        self.script.lock().unwrap().logs_stay_open = open;
    }

    pub fn live_log_sessions(&self) -> usize {
        self.live_log_sessions.load(Ordering::SeqCst)
    }

    /// Wait (in small virtual-time steps) until `op` was called `n` times.
    pub async fn wait_for(&self, op: EngineOp, n: usize) {
        while self.count(op) < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn perform(&self, op: EngineOp, service: &str) -> Result<()> {
        self.calls.lock().unwrap().push(op);

        let gate = self.script.lock().unwrap().gates.get(&op).cloned();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let fail = {
            let mut script = self.script.lock().unwrap();
            let once = match script.fail_next.get_mut(&op) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            };
            once || script.fail_always.contains(&op)
        };

        if fail {
            Err(DockwatchError::engine(op, service, "scripted failure"))
        } else {
            Ok(())
        }
    }

    async fn logs(&self, lines_tx: mpsc::Sender<String>) -> Result<()> {
        self.calls.lock().unwrap().push(EngineOp::Logs);
        self.live_log_sessions.fetch_add(1, Ordering::SeqCst);
        let _count = SessionCount(Arc::clone(&self.live_log_sessions));

        let (lines, stay_open) = {
            let script = self.script.lock().unwrap();
            (script.log_lines.clone(), script.logs_stay_open)
        };
        for line in lines {
            if lines_tx.send(line).await.is_err() {
                return Ok(());
            }
        }
        if stay_open {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

impl ContainerEngine for FakeEngine {
    fn build<'a>(&'a self, service: &'a str) -> EngineFuture<'a> {
        Box::pin(self.perform(EngineOp::Build, service))
    }

    fn start<'a>(&'a self, service: &'a str) -> EngineFuture<'a> {
        Box::pin(self.perform(EngineOp::Start, service))
    }

    fn stop<'a>(&'a self, service: &'a str) -> EngineFuture<'a> {
        Box::pin(self.perform(EngineOp::Stop, service))
    }

    fn restart<'a>(&'a self, service: &'a str) -> EngineFuture<'a> {
        Box::pin(self.perform(EngineOp::Restart, service))
    }

    fn stream_logs<'a>(
        &'a self,
        _service: &'a str,
        _tail: u32,
        lines: mpsc::Sender<String>,
    ) -> EngineFuture<'a> {
        Box::pin(self.logs(lines))
    }
}
