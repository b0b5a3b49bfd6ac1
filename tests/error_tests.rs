//! Tests for error types.
//!
//! Validates display formatting and the error classification helpers.

use runonce::Error;
use std::error::Error as _;
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Display Tests
// =============================================================================

#[test]
fn test_create_failed_display() {
    let err = Error::CreateFailed {
        name: "openamt-rpc-go".to_string(),
        reason: "conflict".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("openamt-rpc-go"), "should include container name");
    assert!(msg.contains("conflict"), "should include reason");
}

#[test]
fn test_pull_failed_display() {
    let err = Error::PullFailed {
        reference: "alpine:3.19".to_string(),
        reason: "manifest unknown".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("alpine:3.19"));
    assert!(msg.contains("manifest unknown"));
}

#[test]
fn test_timeout_display() {
    let err = Error::Timeout {
        operation: "wait for container amt".to_string(),
        duration: Duration::from_secs(30),
    };
    let msg = err.to_string();

    assert!(msg.contains("30s"));
    assert!(msg.contains("wait for container amt"));
}

#[test]
fn test_nonzero_exit_display() {
    let err = Error::NonZeroExit {
        name: "amt".to_string(),
        code: 127,
        output: "not found".to_string(),
        cleanup_warning: None,
    };

    assert_eq!(err.to_string(), "container 'amt' exited with status 127");
}

#[test]
fn test_endpoint_not_found_display() {
    assert_eq!(Error::EndpointNotFound(5).to_string(), "endpoint not found: 5");
}

// =============================================================================
// Source Chain Tests
// =============================================================================

#[test]
fn test_config_read_keeps_source() {
    let err = Error::ConfigRead {
        path: PathBuf::from("/etc/runonce.json"),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
    };

    assert!(err.to_string().contains("/etc/runonce.json"));
    assert!(err.source().is_some());
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: Error = io.into();

    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn test_serde_error_conversion() {
    let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: Error = parse.into();

    assert!(matches!(err, Error::Serialization(_)));
}

// =============================================================================
// Classification Tests
// =============================================================================

#[test]
fn test_create_failed_is_unrecoverable() {
    let err = Error::CreateFailed {
        name: "amt".to_string(),
        reason: "x".to_string(),
    };
    assert!(err.is_unrecoverable());
    assert!(!err.is_cleanup_failure());
}

#[test]
fn test_runtime_failures_are_not_usage_errors() {
    let cases = [
        Error::StartFailed {
            name: "amt".to_string(),
            reason: "x".to_string(),
        },
        Error::WaitFailed {
            name: "amt".to_string(),
            reason: "x".to_string(),
        },
        Error::LogFetchFailed {
            name: "amt".to_string(),
            reason: "x".to_string(),
        },
        Error::Cancelled {
            operation: "pull".to_string(),
        },
    ];

    for err in cases {
        assert!(!err.is_usage_error(), "{} is not a usage error", err);
        assert!(!err.is_unrecoverable(), "{} may be retried", err);
    }
}

#[test]
fn test_remove_failed_is_cleanup_failure() {
    let err = Error::RemoveFailed {
        name: "amt".to_string(),
        reason: "busy".to_string(),
    };
    assert!(err.is_cleanup_failure());
    assert!(!err.is_unrecoverable());
}

#[test]
fn test_nonzero_exit_carries_output_and_warning() {
    let err = Error::NonZeroExit {
        name: "amt".to_string(),
        code: 1,
        output: "Failed to connect to LMS\n".to_string(),
        cleanup_warning: Some("driver busy".to_string()),
    };

    assert_eq!(err.task_output(), Some("Failed to connect to LMS\n"));
    assert_eq!(err.cleanup_warning(), Some("driver busy"));
}

#[test]
fn test_other_errors_carry_no_output() {
    let err = Error::WaitFailed {
        name: "amt".to_string(),
        reason: "broken pipe".to_string(),
    };

    assert_eq!(err.task_output(), None);
    assert_eq!(err.cleanup_warning(), None);
}

#[test]
fn test_usage_errors() {
    let cases = [
        Error::Config("bad".to_string()),
        Error::EndpointNotFound(1),
        Error::InvalidTargetHost {
            host: "ftp://x".to_string(),
            reason: "scheme".to_string(),
        },
        Error::InvalidContainerName {
            name: "-x".to_string(),
            reason: "leading dash".to_string(),
        },
    ];

    for err in cases {
        assert!(err.is_usage_error(), "{} should be a usage error", err);
    }
}
