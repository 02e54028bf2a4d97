// tests/log_stream.rs

mod common;
use crate::common::{init_tracing, with_timeout, FakeEngine};

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use dockwatch::engine::LogStreamGuard;
use dockwatch::types::EngineOp;

fn guard(engine: &FakeEngine) -> LogStreamGuard {
    LogStreamGuard::new(Arc::new(engine.clone()), "api", 100)
}

#[tokio::test(start_paused = true)]
async fn only_one_session_at_a_time() {
    init_tracing();
    let engine = FakeEngine::new();
    engine.keep_logs_open(true);
    let logs = guard(&engine);

    assert!(logs.start());
    assert!(!logs.start());
    assert!(!logs.clone().start());
    sleep(Duration::from_millis(10)).await;

    assert!(logs.is_active());
    assert_eq!(engine.count(EngineOp::Logs), 1);
    assert_eq!(engine.live_log_sessions(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_ends_the_session() {
    let engine = FakeEngine::new();
    engine.keep_logs_open(true);
    engine.set_log_lines(&["one", "two"]);
    let logs = guard(&engine);

    logs.start();
    with_timeout(engine.wait_for(EngineOp::Logs, 1)).await;

    with_timeout(logs.stop()).await;
    assert!(!logs.is_active());
    assert_eq!(engine.live_log_sessions(), 0);

    // Stopping again is harmless.
    with_timeout(logs.stop()).await;
}

#[tokio::test(start_paused = true)]
async fn finished_session_can_be_restarted() {
    init_tracing();
    let engine = FakeEngine::new();
    engine.set_log_lines(&["Running plumber API", "<simpleError in f(): boom>"]);
    let logs = guard(&engine);

    assert!(logs.start());
    sleep(Duration::from_millis(10)).await;
    assert!(!logs.is_active());
    assert_eq!(engine.live_log_sessions(), 0);

    assert!(logs.start());
    with_timeout(engine.wait_for(EngineOp::Logs, 2)).await;
}

#[tokio::test(start_paused = true)]
async fn stop_without_session_is_a_no_op() {
    let engine = FakeEngine::new();
    let logs = guard(&engine);
    with_timeout(logs.stop()).await;
    assert!(engine.calls().is_empty());
}
