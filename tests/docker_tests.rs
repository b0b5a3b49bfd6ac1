//! Tests against a real Docker daemon.
//!
//! Ignored by default. Run with `cargo test -- --ignored` on a host whose
//! local engine can pull `alpine:3.19`.

use runonce::{ensure_image, execute_on, RunnerConfig, RuntimeConnection, TargetHost, TaskRequest};
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[ignore = "needs a local Docker daemon"]
async fn test_docker_pull_drains() {
    let connection = RuntimeConnection::open(&TargetHost::Local).unwrap();

    let summary = ensure_image(
        connection.runtime().as_ref(),
        "alpine:3.19",
        RunnerConfig::default().pull_timeout(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(summary.events > 0);
}

#[tokio::test]
#[ignore = "needs a local Docker daemon"]
async fn test_docker_echo_round_trip() {
    let name = format!("runonce-it-{}", std::process::id());
    let request = TaskRequest::new("alpine:3.19", name, ["echo", "hello-amt-info"]);

    let result = execute_on(
        &TargetHost::Local,
        &request,
        &RunnerConfig::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    // TTY mode turns "\n" into "\r\n".
    assert_eq!(result.output.trim_end(), "hello-amt-info");
    assert!(result.succeeded());
    assert!(result.cleanup_warning.is_none());
}
