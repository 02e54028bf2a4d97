//! Shared helpers for dockwatch's integration tests.

pub mod builders;
pub mod fake_engine;

use std::future::Future;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

/// Upper bound for any single awaited step in a test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test-captured tracing subscriber (once per test binary).
///
/// Output only shows for failing tests unless run with `--nocapture`. The
/// level comes from `DOCKWATCH_LOG`, e.g. `DOCKWATCH_LOG=debug cargo test`.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("DOCKWATCH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call in the same binary finds a subscriber already set.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(true)
        .try_init();
}

/// Await `f`, failing the test if it takes longer than [`TEST_TIMEOUT`].
///
/// Under `start_paused = true` the clock auto-advances, so a wedged test
/// fails here instead of hanging.
pub async fn with_timeout<F: Future>(f: F) -> F::Output {
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(out) => out,
        Err(_) => panic!("test step did not finish within {TEST_TIMEOUT:?}"),
    }
}
