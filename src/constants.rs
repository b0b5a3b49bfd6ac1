//! # Task Runner Constants
//!
//! Defines the limits, timeouts, and fixed task definitions for the
//! ephemeral-container runner. These constants are the **single source of
//! truth** for bounds used throughout the codebase; [`crate::config`] only
//! overrides the timeouts and the diagnostic task, never the validation rules.
//!
//! ## Cross-References
//!
//! - [`crate::provision`]: Uses the image reference limits and pull timeout
//! - [`crate::task`]: Uses the container name rules and wait/remove timeouts
//! - [`crate::diagnostics`]: Uses the fixed AMT info task definition
//! - [`crate::connection`]: Uses the engine API timeout

use std::time::Duration;

// =============================================================================
// Input Limits
// =============================================================================

/// Maximum image reference length in bytes.
///
/// **Security**: Rejects overly long references before they reach the
/// engine API. Registries generally enforce lower limits.
pub const MAX_IMAGE_REF_LEN: usize = 512;

/// Maximum container name length.
///
/// **Rationale**: 128 characters accommodates prefixes plus UUIDs while
/// staying well inside the engine's own limits.
pub const MAX_CONTAINER_NAME_LEN: usize = 128;

/// Maximum number of command arguments passed to a task container.
pub const MAX_COMMAND_ARGS: usize = 256;

// =============================================================================
// Timeouts
// =============================================================================
//
// The pull drain and the terminal wait are the only steps that block on the
// runtime making progress. Both are bounded so that a stuck registry or a
// container that never exits cannot hold an invocation forever.
// =============================================================================

/// Timeout for draining an image pull (5 minutes).
///
/// **Rationale**: Accommodates large images on slow links while ensuring a
/// stalled registry eventually fails the invocation.
pub const IMAGE_PULL_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for a task container to reach the not-running state (10 minutes).
///
/// Tasks are short diagnostics; anything running longer is treated as hung.
pub const CONTAINER_WAIT_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for the cleanup removal of a task container (30 seconds).
pub const CONTAINER_REMOVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request timeout handed to the engine API client (15 minutes).
///
/// Must exceed [`CONTAINER_WAIT_TIMEOUT`]: the wait is a single long-poll
/// request and would otherwise be cut off by the client first.
pub const ENGINE_API_TIMEOUT: Duration = Duration::from_secs(900);

// =============================================================================
// Validation Patterns
// =============================================================================

/// Valid characters for image references.
///
/// Includes: `a-z`, `A-Z`, `0-9`, `-`, `_`, `.`, `/`, `:`, `@`
///
/// The `@` is for digest references like `alpine@sha256:abc...`.
/// The `:` is for tags and registry ports like `registry:5000/app:1.0`.
pub const IMAGE_REF_VALID_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_./:@";

/// Valid characters for container names.
///
/// Matches the engine's own rule `[a-zA-Z0-9][a-zA-Z0-9_.-]*`; the leading
/// character is checked separately in [`validate_container_name`].
pub const CONTAINER_NAME_VALID_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_.";

/// Default tag used when a reference names neither a tag nor a digest.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

// =============================================================================
// AMT Host Diagnostic Task
// =============================================================================
//
// The inbound diagnostic operation runs a fixed image and command. These are
// internal constants; the caller only chooses the endpoint.
// =============================================================================

/// Image that carries the Intel AMT `rpc` client.
pub const AMT_INFO_IMAGE: &str = "ptrrd/openamt:rpc-go";

/// Container name used for the AMT info task.
pub const AMT_INFO_CONTAINER_NAME: &str = "openamt-rpc-go";

/// Arguments passed to the AMT info image.
pub const AMT_INFO_COMMAND: &[&str] = &["amtinfo"];

// =============================================================================
// Environment Variables
// =============================================================================

/// Environment variable naming the settings file for the CLI.
pub const CONFIG_PATH_ENV: &str = "RUNONCE_CONFIG";

/// Environment variable holding the `tracing` filter directive for the CLI.
pub const LOG_FILTER_ENV: &str = "RUNONCE_LOG";

// =============================================================================
// Validation Helpers
// =============================================================================

/// Validates an image reference before it is handed to the engine.
///
/// # Returns
///
/// `Ok(())` if valid, `Err(reason)` with a description of the failure.
#[must_use = "validation result must be checked before pulling"]
pub fn validate_image_reference(reference: &str) -> std::result::Result<(), &'static str> {
    if reference.is_empty() {
        return Err("image reference cannot be empty");
    }
    if reference.len() > MAX_IMAGE_REF_LEN {
        return Err("image reference exceeds maximum length");
    }
    if !reference.chars().all(|c| IMAGE_REF_VALID_CHARS.contains(c)) {
        return Err("image reference contains invalid characters");
    }
    if reference.starts_with(['/', ':', '@']) || reference.ends_with(['/', ':', '@']) {
        return Err("image reference is malformed");
    }
    Ok(())
}

/// Validates a container name for the engine.
///
/// # Security
///
/// Names end up in API paths, so only the engine's allowlisted characters
/// are accepted and the first character must be alphanumeric.
#[inline]
#[must_use = "validation result must be checked before creating a container"]
pub fn validate_container_name(name: &str) -> std::result::Result<(), &'static str> {
    let Some(first) = name.chars().next() else {
        return Err("container name cannot be empty");
    };
    if name.len() > MAX_CONTAINER_NAME_LEN {
        return Err("container name exceeds maximum length");
    }
    if !first.is_ascii_alphanumeric() {
        return Err("container name must start with an alphanumeric character");
    }
    if !name.chars().all(|c| CONTAINER_NAME_VALID_CHARS.contains(c)) {
        return Err("container name contains invalid characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name_rules() {
        assert!(validate_container_name("openamt-rpc-go").is_ok());
        assert!(validate_container_name("task_1.2").is_ok());
        assert!(validate_container_name("").is_err());
        assert!(validate_container_name("-leading").is_err());
        assert!(validate_container_name("has space").is_err());
        assert!(validate_container_name("../escape").is_err());
        assert!(validate_container_name(&"a".repeat(MAX_CONTAINER_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_image_reference_rules() {
        assert!(validate_image_reference(AMT_INFO_IMAGE).is_ok());
        assert!(validate_image_reference("registry:5000/team/app@sha256:abcd").is_ok());
        assert!(validate_image_reference("").is_err());
        assert!(validate_image_reference("nginx :latest").is_err());
        assert!(validate_image_reference("nginx:").is_err());
        assert!(validate_image_reference(&"a".repeat(MAX_IMAGE_REF_LEN + 1)).is_err());
    }

    #[test]
    fn test_api_timeout_outlasts_wait() {
        assert!(ENGINE_API_TIMEOUT > CONTAINER_WAIT_TIMEOUT);
    }
}
