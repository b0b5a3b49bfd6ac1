//! Tests for the host info diagnostic.

mod common;

use common::{Call, MockRuntime, Script, WaitScript};
use runonce::{
    host_info, host_info_on, EndpointId, Error, HostInfo, RunnerConfig, RuntimeError, Settings,
    AMT_INFO_CONTAINER_NAME, AMT_INFO_IMAGE,
};
use tokio_util::sync::CancellationToken;

fn config() -> RunnerConfig {
    RunnerConfig {
        pull_timeout_secs: 5,
        wait_timeout_secs: 5,
        remove_timeout_secs: 1,
        ..Default::default()
    }
}

// =============================================================================
// Host Info Tests
// =============================================================================

#[tokio::test]
async fn test_host_info_runs_amt_tool() {
    let (mock, runtime) = MockRuntime::shared(Script::default());

    let cancel = CancellationToken::new();
    let info = host_info_on(&runtime, EndpointId(1), &config(), &cancel)
        .await
        .unwrap();

    assert_eq!(
        info,
        HostInfo {
            endpoint: EndpointId(1),
            text: "hello-amt-info\n".to_string(),
        }
    );

    let calls = mock.calls();
    assert_eq!(calls[0], Call::Pull(AMT_INFO_IMAGE.to_string()));
    assert_eq!(calls[1], Call::Create(AMT_INFO_CONTAINER_NAME.to_string()));
    assert!(mock.live_containers().is_empty());
}

#[tokio::test]
async fn test_host_info_uses_configured_task() {
    let (mock, runtime) = MockRuntime::shared(Script::default());
    let image = "mirror.local/openamt:rpc-go";
    let mut config = config();
    config.diagnostic.image = image.to_string();
    config.diagnostic.container_name = "amt-check".to_string();

    let cancel = CancellationToken::new();
    host_info_on(&runtime, EndpointId(4), &config, &cancel)
        .await
        .unwrap();

    assert!(mock.called(|c| *c == Call::Pull(image.to_string())));
    assert!(mock.called(|c| *c == Call::Create("amt-check".to_string())));
}

#[tokio::test]
async fn test_host_info_reports_nonzero_exit_output() {
    let (_mock, runtime) = MockRuntime::shared(Script {
        wait: WaitScript::Exit(1),
        log_chunks: vec![b"Failed to connect to LMS\n".to_vec()],
        ..Default::default()
    });

    let cancel = CancellationToken::new();
    let info = host_info_on(&runtime, EndpointId(1), &config(), &cancel)
        .await
        .unwrap();

    assert_eq!(info.text, "Failed to connect to LMS\n");
}

#[tokio::test]
async fn test_host_info_create_failure() {
    let (mock, runtime) = MockRuntime::shared(Script {
        create_error: Some(RuntimeError::with_status(409, "name in use")),
        ..Default::default()
    });

    let cancel = CancellationToken::new();
    let err = host_info_on(&runtime, EndpointId(1), &config(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CreateFailed { .. }));
    assert!(!mock.called(|c| matches!(c, Call::Start(_))));
}

#[tokio::test]
async fn test_host_info_unknown_endpoint() {
    let settings = Settings::default();

    let cancel = CancellationToken::new();
    let err = host_info(EndpointId(77), &settings, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::EndpointNotFound(77)));
}

// =============================================================================
// Response Shape Tests
// =============================================================================

#[test]
fn test_host_info_json_shape() {
    let info = HostInfo {
        endpoint: EndpointId(1),
        text: "Version: 16.1.25\n".to_string(),
    };

    let value = serde_json::to_value(&info).unwrap();

    assert_eq!(
        value,
        serde_json::json!({ "Endpoint": 1, "Text": "Version: 16.1.25\n" })
    );
}
