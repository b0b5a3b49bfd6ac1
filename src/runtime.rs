//! Container runtime trait - the outbound surface of the task runner.
//!
//! This trait defines the six primitive operations a task needs from a
//! container engine:
//! - `pull_image`: Stream the progress of an image pull
//! - `create_container`: Create a named container from a [`ContainerSpec`]
//! - `start_container`: Start a created container
//! - `wait_container`: Watch for the not-running condition (two channels)
//! - `container_logs`: Stream the full, buffered output of a container
//! - `remove_container`: Force-remove a container
//!
//! # Lifecycle
//!
//! ```text
//!   ┌─────────┐   create   ┌─────────┐   start   ┌─────────┐
//!   │ (none)  │ ─────────► │ Created │ ────────► │ Running │
//!   └─────────┘            └────┬────┘           └────┬────┘
//!                               │ remove              │ exits
//!                               ▼                     ▼
//!                          ┌─────────┐  remove   ┌─────────┐  logs
//!                          │ Removed │ ◄──────── │ Stopped │ ──────►
//!                          └─────────┘           └─────────┘
//! ```
//!
//! Runtime implementations report failures as [`RuntimeError`]; the task
//! runner wraps them into the step-specific variants of [`crate::Error`].

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

// =============================================================================
// Runtime Errors
// =============================================================================

/// Failure reported by a runtime primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RuntimeError {
    /// HTTP-style status reported by the engine, when there is one.
    pub status: Option<u16>,
    /// Human-readable reason.
    pub message: String,
}

impl RuntimeError {
    /// Creates an error without an engine status.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Creates an error carrying the engine's status code.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Returns true if the engine reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    /// Returns true if the engine reported a name or state conflict.
    pub fn is_conflict(&self) -> bool {
        self.status == Some(409)
    }
}

/// Result type alias for runtime primitives.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

// =============================================================================
// Streams
// =============================================================================

/// One decoded status record from an image pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullProgress {
    /// Layer or image id the record refers to.
    pub id: Option<String>,
    /// Status text (e.g. "Pulling fs layer", "Download complete").
    pub status: Option<String>,
    /// Progress bar text, if the engine sent one.
    pub progress: Option<String>,
}

impl PullProgress {
    /// Creates a record with only a status line.
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Default::default()
        }
    }
}

/// Progress stream of an image pull; ends when the pull completes.
pub type PullStream = Pin<Box<dyn Stream<Item = RuntimeResult<PullProgress>> + Send>>;

/// Output stream of a stopped container; ends after the last buffered frame.
pub type LogStream = Pin<Box<dyn Stream<Item = RuntimeResult<Vec<u8>>> + Send>>;

// =============================================================================
// Container Spec
// =============================================================================

/// Creation parameters for a task container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image reference the container is created from.
    pub image: String,
    /// Arguments passed to the image entrypoint.
    pub command: Vec<String>,
    /// Environment entries in `KEY=VALUE` form.
    pub env: Vec<String>,
    /// Allocate a TTY.
    pub tty: bool,
    /// Keep stdin open.
    pub open_stdin: bool,
    /// Attach stdout.
    pub attach_stdout: bool,
    /// Attach stderr.
    pub attach_stderr: bool,
    /// Run privileged (device and system access).
    pub privileged: bool,
}

impl ContainerSpec {
    /// Spec for a one-shot task: TTY, stdin open, stdout and stderr
    /// attached, privileged, no extra environment.
    pub fn task(image: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            image: image.into(),
            command,
            env: Vec::new(),
            tty: true,
            open_stdin: true,
            attach_stdout: true,
            attach_stderr: true,
            privileged: true,
        }
    }

    /// Adds environment entries.
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }
}

// =============================================================================
// Wait Channels
// =============================================================================

/// Terminal status of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitStatus {
    /// Exit code of the container's main process.
    pub exit_code: i64,
}

impl WaitStatus {
    /// Returns true if the process exited with status 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Sending half of a [`ContainerWait`], held by the runtime.
///
/// Each channel delivers at most one value. A runtime normally fires exactly
/// one of them through [`exited`](Self::exited) or [`failed`](Self::failed).
#[derive(Debug)]
pub struct WaitSenders {
    pub status: oneshot::Sender<WaitStatus>,
    pub error: oneshot::Sender<RuntimeError>,
}

impl WaitSenders {
    /// Reports the terminal status and closes the error channel.
    pub fn exited(self, exit_code: i64) {
        // The receiver is gone once the race is decided or abandoned.
        let _ = self.status.send(WaitStatus { exit_code });
    }

    /// Reports a wait failure and closes the status channel.
    pub fn failed(self, error: RuntimeError) {
        // Nobody is listening once the wait has been dropped.
        let _ = self.error.send(error);
    }
}

/// Receiving half of a wait: a status channel and an error channel.
///
/// The task runner races the two and proceeds on whichever fires first.
/// Dropping the wait aborts the runtime task feeding it, so the losing side
/// never outlives the race.
#[derive(Debug)]
pub struct ContainerWait {
    pub(crate) status: oneshot::Receiver<WaitStatus>,
    pub(crate) error: oneshot::Receiver<RuntimeError>,
    driver: Option<JoinHandle<()>>,
}

impl ContainerWait {
    /// Creates a connected pair of wait senders and receivers.
    pub fn channel() -> (WaitSenders, Self) {
        let (status_tx, status_rx) = oneshot::channel();
        let (error_tx, error_rx) = oneshot::channel();
        (
            WaitSenders {
                status: status_tx,
                error: error_tx,
            },
            Self {
                status: status_rx,
                error: error_rx,
                driver: None,
            },
        )
    }

    /// Attaches the task producing the wait result; it is aborted on drop.
    pub fn with_driver(mut self, driver: JoinHandle<()>) -> Self {
        self.driver = Some(driver);
        self
    }
}

impl Drop for ContainerWait {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

// =============================================================================
// Container Runtime Trait
// =============================================================================

/// Container engine operations needed to run one ephemeral task.
///
/// Implementations must tolerate concurrent container lifecycles; nothing
/// here is stateful beyond the connection to the engine.
///
/// # Implementations
///
/// - `DockerRuntime`: Docker Engine API via bollard (local socket or TCP)
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Returns the runtime name.
    fn name(&self) -> &str;

    /// Starts pulling `reference` and returns its progress stream.
    ///
    /// The pull is only complete once the stream has ended.
    fn pull_image(&self, reference: &str) -> PullStream;

    /// Creates a container named `name` and returns its id.
    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> RuntimeResult<String>;

    /// Starts a created container.
    async fn start_container(&self, id: &str) -> RuntimeResult<()>;

    /// Watches for the container to reach the not-running condition.
    fn wait_container(&self, id: &str) -> ContainerWait;

    /// Streams the complete stdout/stderr log of the container.
    fn container_logs(&self, id: &str) -> LogStream;

    /// Force-removes a container. Removing a missing container succeeds.
    async fn remove_container(&self, id: &str) -> RuntimeResult<()>;
}
