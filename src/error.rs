//! Error types for the task runner.

use std::path::PathBuf;

/// Result type alias for task runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while provisioning and running a task.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Endpoint / Connection Errors
    // =========================================================================
    /// Endpoint identifier is not known to the registry.
    #[error("endpoint not found: {0}")]
    EndpointNotFound(u32),

    /// Target host string could not be parsed.
    #[error("invalid target host '{host}': {reason}")]
    InvalidTargetHost { host: String, reason: String },

    /// Could not open a connection to the container engine.
    #[error("failed to connect to engine at {host}: {reason}")]
    ConnectionFailed { host: String, reason: String },

    // =========================================================================
    // Image Errors
    // =========================================================================
    /// Image reference failed validation.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidImageReference { reference: String, reason: String },

    /// Image pull could not be started or its progress stream broke.
    #[error("failed to pull image '{reference}': {reason}")]
    PullFailed { reference: String, reason: String },

    // =========================================================================
    // Container Lifecycle Errors
    // =========================================================================
    /// Container name failed validation.
    #[error("invalid container name '{name}': {reason}")]
    InvalidContainerName { name: String, reason: String },

    /// Container create was rejected. Never retried, nothing to clean up.
    #[error("failed to create container '{name}': {reason}")]
    CreateFailed { name: String, reason: String },

    /// Container start failed.
    #[error("failed to start container '{name}': {reason}")]
    StartFailed { name: String, reason: String },

    /// The wait error channel fired before a terminal status arrived.
    #[error("failed waiting for container '{name}': {reason}")]
    WaitFailed { name: String, reason: String },

    /// Log retrieval failed after the container stopped.
    #[error("failed to fetch logs of container '{name}': {reason}")]
    LogFetchFailed { name: String, reason: String },

    /// Cleanup removal failed.
    #[error("failed to remove container '{name}': {reason}")]
    RemoveFailed { name: String, reason: String },

    /// Task exited nonzero while the runner was asked to treat that as failure.
    /// The captured output and any cleanup failure travel with it.
    #[error("container '{name}' exited with status {code}")]
    NonZeroExit {
        name: String,
        code: i64,
        output: String,
        cleanup_warning: Option<String>,
    },

    // =========================================================================
    // Timeout / Cancellation Errors
    // =========================================================================
    /// Operation timed out.
    #[error("operation timed out after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: std::time::Duration,
    },

    /// Operation was cancelled by the caller.
    #[error("operation cancelled: {operation}")]
    Cancelled { operation: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Settings were rejected.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Settings file could not be read.
    #[error("failed to read {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for failures that must not be retried or cleaned up
    /// after: a rejected create and any request that failed validation.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            Self::CreateFailed { .. }
                | Self::InvalidContainerName { .. }
                | Self::InvalidImageReference { .. }
                | Self::InvalidTargetHost { .. }
        )
    }

    /// Returns true if the error came from the cleanup step.
    pub fn is_cleanup_failure(&self) -> bool {
        matches!(self, Self::RemoveFailed { .. })
    }

    /// Output the task produced before failing, if it got that far.
    pub fn task_output(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Cleanup failure that accompanied the error, if any.
    pub fn cleanup_warning(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit {
                cleanup_warning,
                ..
            } => cleanup_warning.as_deref(),
            _ => None,
        }
    }

    /// Returns true for operator-side problems (bad settings or input)
    /// rather than a failed task.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::ConfigRead { .. }
                | Self::Serialization(_)
                | Self::EndpointNotFound(_)
                | Self::InvalidTargetHost { .. }
                | Self::InvalidImageReference { .. }
                | Self::InvalidContainerName { .. }
        )
    }
}
