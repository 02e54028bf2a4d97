// tests/compose_engine.rs

mod common;
use crate::common::{init_tracing, TestResult};

use std::path::Path;

use tokio::sync::mpsc;

use dockwatch::errors::DockwatchError;
use dockwatch::exec::{ComposeEngine, ContainerEngine};
use dockwatch::types::EngineOp;

#[test]
fn compose_arguments_per_operation() {
    let engine = ComposeEngine::new("docker", "/srv/app/docker-compose.yml");
    let base = ["compose", "-f", "/srv/app/docker-compose.yml"];
    let with = |rest: &[&str]| -> Vec<String> {
        base.iter().chain(rest).map(|s| s.to_string()).collect()
    };

    assert_eq!(engine.args(EngineOp::Build, "api", 0), with(&["build", "api"]));
    assert_eq!(engine.args(EngineOp::Start, "api", 0), with(&["up", "-d", "api"]));
    assert_eq!(engine.args(EngineOp::Stop, "api", 0), with(&["stop", "api"]));
    assert_eq!(engine.args(EngineOp::Restart, "api", 0), with(&["restart", "api"]));
    assert_eq!(
        engine.args(EngineOp::Logs, "api", 25),
        with(&["logs", "-f", "--no-color", "--tail", "25", "api"])
    );
}

/// A stand-in for `docker compose`.
///
/// The engine runs `sh compose -f <file> <sub...> <service>` with the compose
/// directory as working directory, so `sh` executes this script.
const FAKE_COMPOSE: &str = r#"
case "$3" in
  build)
    echo "step 1/4 : FROM rocker/r-ver" >&2
    echo "error: pull access denied" >&2
    exit 17
    ;;
  logs)
    echo "Running plumber API at http://0.0.0.0:8000"
    echo "Running swagger Docs at http://127.0.0.1:8000/__docs__/"
    exit 0
    ;;
esac
echo "ok $3 $4"
exit 0
"#;

#[cfg(unix)]
fn fake_engine(dir: &Path) -> std::io::Result<ComposeEngine> {
    std::fs::write(dir.join("compose"), FAKE_COMPOSE)?;
    let compose_file = dir.join("docker-compose.yml");
    std::fs::write(&compose_file, "services: {}\n")?;
    Ok(ComposeEngine::new("sh", compose_file))
}

#[cfg(unix)]
#[tokio::test]
async fn successful_operations_return_ok() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let engine = fake_engine(dir.path())?;

    engine.stop("api").await?;
    engine.start("api").await?;
    engine.restart("api").await?;
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn failed_operation_reports_exit_code_and_stderr() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let engine = fake_engine(dir.path())?;

    match engine.build("api").await {
        Err(DockwatchError::EngineFailure { op, service, detail }) => {
            assert_eq!(op, EngineOp::Build);
            assert_eq!(service, "api");
            assert!(detail.contains("exit status 17"), "{detail}");
            assert!(detail.contains("pull access denied"), "{detail}");
        }
        other => panic!("expected engine failure, got {other:?}"),
    }
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn log_lines_are_forwarded() -> TestResult {
    let dir = tempfile::tempdir()?;
    let engine = fake_engine(dir.path())?;

    let (tx, mut rx) = mpsc::channel(16);
    engine.stream_logs("api", 10, tx).await?;

    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        lines.push(line);
    }
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Running plumber API"));
    Ok(())
}

#[tokio::test]
async fn missing_binary_is_an_engine_failure() {
    let engine = ComposeEngine::new("/nonexistent/dockwatch-docker", "docker-compose.yml");
    let err = engine.stop("api").await.unwrap_err();
    assert!(err.to_string().contains("failed to spawn"), "{err}");
}

#[tokio::test]
async fn logs_is_not_a_lifecycle_step() {
    let engine = ComposeEngine::new("/definitely/not/docker", "/srv/app/docker-compose.yml");

    match engine.run(EngineOp::Logs, "api").await {
        Err(DockwatchError::EngineFailure { op, service, detail }) => {
            assert_eq!(op, EngineOp::Logs);
            assert_eq!(service, "api");
            assert!(detail.contains("stream_logs"), "{detail}");
        }
        other => panic!("expected an engine failure, got {other:?}"),
    }
}
