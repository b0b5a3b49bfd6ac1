//! # Task Runner - One Command in One Ephemeral Container
//!
//! Runs a single command to completion in a fresh container and always
//! removes that container afterwards.
//!
//! ## State Machine
//!
//! ```text
//!   create ──► start ──► wait ──► collect ──► remove ──► result
//!     │          │         │          │
//!     │          └─────────┴──────────┴──► remove ──► first error
//!     │
//!     └──► CreateFailed (nothing to remove, never retried)
//! ```
//!
//! Steps run strictly in order. Once a container exists it is owned by a
//! guard: the explicit remove step disarms it, and if the run is abandoned
//! (future dropped, panic) the guard schedules a forced removal on drop.
//!
//! ## Wait Race
//!
//! The wait step races four sources and acts on whichever resolves first:
//!
//! | Source              | Outcome                          |
//! |---------------------|----------------------------------|
//! | cancellation token  | [`Error::Cancelled`]             |
//! | wait error channel  | [`Error::WaitFailed`], no collect|
//! | wait status channel | exit status recorded, collect    |
//! | deadline            | [`Error::Timeout`]               |
//!
//! Every outcome after create still goes through remove.
//!
//! ## Exit Status
//!
//! A nonzero exit is not a failure by default: the output is returned with
//! [`TaskResult::exit_status`] set. Callers that want a hard failure set
//! [`RunnerConfig::fail_on_nonzero_exit`].
//!
//! ## Cleanup Failures
//!
//! If removal fails after the output was collected, the output is still
//! returned and the failure is reported in [`TaskResult::cleanup_warning`].

use crate::config::RunnerConfig;
use crate::connection::{RuntimeConnection, TargetHost};
use crate::constants::{validate_container_name, validate_image_reference, MAX_COMMAND_ARGS};
use crate::error::{Error, Result};
use crate::provision::ensure_image;
use crate::runtime::{ContainerRuntime, ContainerSpec, WaitStatus};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// =============================================================================
// Request / Result
// =============================================================================

/// What to run: image, container name and command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    /// Image reference the container is created from.
    pub image: String,
    /// Name given to the container. Must be unique among concurrent tasks
    /// on the same host.
    pub container_name: String,
    /// Arguments passed to the image entrypoint.
    pub command: Vec<String>,
    /// Extra environment entries in `KEY=VALUE` form. Empty by default.
    pub env: Vec<String>,
}

impl TaskRequest {
    pub fn new<I, S>(
        image: impl Into<String>,
        container_name: impl Into<String>,
        command: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            image: image.into(),
            container_name: container_name.into(),
            command: command.into_iter().map(Into::into).collect(),
            env: Vec::new(),
        }
    }

    /// Adds environment entries.
    pub fn with_env<I, S>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env = env.into_iter().map(Into::into).collect();
        self
    }

    /// Rejects requests the runtime would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        validate_image_reference(&self.image).map_err(|reason| Error::InvalidImageReference {
            reference: self.image.clone(),
            reason: reason.to_string(),
        })?;

        validate_container_name(&self.container_name).map_err(|reason| {
            Error::InvalidContainerName {
                name: self.container_name.clone(),
                reason: reason.to_string(),
            }
        })?;

        if self.command.len() > MAX_COMMAND_ARGS {
            return Err(Error::Config(format!(
                "command has {} arguments (max {})",
                self.command.len(),
                MAX_COMMAND_ARGS
            )));
        }

        if let Some(bad) = self.env.iter().find(|entry| !entry.contains('=')) {
            return Err(Error::Config(format!(
                "environment entry '{}' is not KEY=VALUE",
                bad
            )));
        }

        Ok(())
    }
}

/// Output of one completed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Engine id of the (now removed) container.
    pub container_id: String,
    /// Everything the container wrote, stdout and stderr.
    pub output: String,
    /// Exit status from the terminal wait event.
    pub exit_status: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when the output was collected but removal failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_warning: Option<String>,
}

impl TaskResult {
    /// Returns true if the task exited with status 0.
    pub fn succeeded(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Wall-clock time from create to removal.
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

// =============================================================================
// Entry Points
// =============================================================================

/// Connects to `host`, provisions the image, runs the task, and releases
/// the connection on every path.
pub async fn execute_on(
    host: &TargetHost,
    request: &TaskRequest,
    config: &RunnerConfig,
    cancel: &CancellationToken,
) -> Result<TaskResult> {
    let connection = RuntimeConnection::open(host)?;
    execute(connection.runtime(), request, config, cancel).await
}

/// Provisions the image and runs the task on an open runtime.
pub async fn execute(
    runtime: &Arc<dyn ContainerRuntime>,
    request: &TaskRequest,
    config: &RunnerConfig,
    cancel: &CancellationToken,
) -> Result<TaskResult> {
    request.validate()?;
    let timeout = config.pull_timeout();
    ensure_image(runtime.as_ref(), &request.image, timeout, cancel).await?;
    run_task(runtime, request, config, cancel).await
}

/// Runs `request` in a new container: create, start, wait, collect, remove.
///
/// The image must already be present (see [`ensure_image`]).
///
/// # Errors
///
/// - [`Error::CreateFailed`]: returned as-is; no other step runs
/// - [`Error::StartFailed`], [`Error::WaitFailed`], [`Error::LogFetchFailed`],
///   [`Error::Timeout`], [`Error::Cancelled`]: returned after removal was
///   attempted
/// - [`Error::NonZeroExit`]: only with `fail_on_nonzero_exit`, carrying the
///   output and cleanup warning a successful return would have had
pub async fn run_task(
    runtime: &Arc<dyn ContainerRuntime>,
    request: &TaskRequest,
    config: &RunnerConfig,
    cancel: &CancellationToken,
) -> Result<TaskResult> {
    request.validate()?;
    let name = request.container_name.as_str();

    if cancel.is_cancelled() {
        return Err(Error::Cancelled {
            operation: format!("create container {}", name),
        });
    }

    let spec = ContainerSpec::task(request.image.as_str(), request.command.clone())
        .with_env(request.env.clone());
    let started_at = Utc::now();

    let id = runtime
        .create_container(name, &spec)
        .await
        .map_err(|e| Error::CreateFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    info!(container = %name, container_id = %id, image = %request.image, "Created container");

    let mut guard = ContainerGuard::new(Arc::clone(runtime), &id, name);
    let outcome = drive(runtime.as_ref(), &id, name, config, cancel).await;
    let removal = guard.remove(config.remove_timeout()).await;
    let finished_at = Utc::now();

    let (status, output) = match outcome {
        Ok(collected) => collected,
        Err(err) => {
            if let Err(cleanup) = removal {
                warn!(
                    container = %name,
                    error = %cleanup,
                    "Cleanup after failed task also failed"
                );
            }
            return Err(err);
        }
    };

    let cleanup_warning = match removal {
        Ok(()) => None,
        Err(cleanup) => {
            warn!(
                container = %name,
                error = %cleanup,
                "Keeping task output despite cleanup failure"
            );
            Some(cleanup.to_string())
        }
    };

    if config.fail_on_nonzero_exit && !status.is_success() {
        return Err(Error::NonZeroExit {
            name: name.to_string(),
            code: status.exit_code,
            output,
            cleanup_warning,
        });
    }

    Ok(TaskResult {
        container_id: id,
        output,
        exit_status: Some(status.exit_code),
        started_at,
        finished_at,
        cleanup_warning,
    })
}

// =============================================================================
// Steps
// =============================================================================

/// Start, wait and collect. Removal is the caller's job.
async fn drive(
    runtime: &dyn ContainerRuntime,
    id: &str,
    name: &str,
    config: &RunnerConfig,
    cancel: &CancellationToken,
) -> Result<(WaitStatus, String)> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled {
            operation: format!("start container {}", name),
        });
    }

    runtime
        .start_container(id)
        .await
        .map_err(|e| Error::StartFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    info!(container = %name, "Started container");

    let status = wait_for_exit(runtime, id, name, config.wait_timeout(), cancel).await?;
    if status.is_success() {
        debug!(container = %name, "Container exited cleanly");
    } else {
        info!(
            container = %name,
            exit_code = status.exit_code,
            "Container exited with nonzero status"
        );
    }

    let output = collect_output(runtime, id, name).await?;
    Ok((status, output))
}

/// Races the wait channels against cancellation and the deadline.
async fn wait_for_exit(
    runtime: &dyn ContainerRuntime,
    id: &str,
    name: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<WaitStatus> {
    let mut wait = runtime.wait_container(id);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    // A channel whose sender went away without a value drops out of the race.
    let mut error_open = true;
    let mut status_open = true;

    loop {
        if !error_open && !status_open {
            return Err(Error::WaitFailed {
                name: name.to_string(),
                reason: "runtime closed the wait without a result".to_string(),
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled {
                    operation: format!("wait for container {}", name),
                });
            }
            received = &mut wait.error, if error_open => match received {
                Ok(err) => {
                    return Err(Error::WaitFailed {
                        name: name.to_string(),
                        reason: err.to_string(),
                    });
                }
                Err(_) => error_open = false,
            },
            received = &mut wait.status, if status_open => match received {
                Ok(status) => return Ok(status),
                Err(_) => status_open = false,
            },
            _ = &mut deadline => {
                return Err(Error::Timeout {
                    operation: format!("wait for container {}", name),
                    duration: timeout,
                });
            }
        }
    }
}

/// Reads the whole log into memory.
async fn collect_output(runtime: &dyn ContainerRuntime, id: &str, name: &str) -> Result<String> {
    let mut stream = runtime.container_logs(id);
    let mut buffer = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::LogFetchFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        buffer.extend_from_slice(&chunk);
    }

    debug!(container = %name, bytes = buffer.len(), "Collected container output");
    // Decode once at the end so multi-byte characters split across frames survive.
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

// =============================================================================
// Container Guard
// =============================================================================

/// Owns a created container until it has been removed.
struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(runtime: Arc<dyn ContainerRuntime>, id: &str, name: &str) -> Self {
        Self {
            runtime,
            id: id.to_string(),
            name: name.to_string(),
            armed: true,
        }
    }

    /// The explicit cleanup step. Disarms the guard whatever the result.
    async fn remove(&mut self, timeout: Duration) -> Result<()> {
        let result = tokio::time::timeout(timeout, self.runtime.remove_container(&self.id)).await;
        self.armed = false;

        match result {
            Ok(Ok(())) => {
                debug!(container = %self.name, container_id = %self.id, "Container cleaned up");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::RemoveFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::RemoveFailed {
                name: self.name.clone(),
                reason: format!("timed out after {:?}", timeout),
            }),
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                container = %self.name,
                container_id = %self.id,
                "No async runtime left, container was not removed"
            );
            return;
        };

        warn!(container = %self.name, "Task abandoned, scheduling container removal");
        let runtime = Arc::clone(&self.runtime);
        let id = std::mem::take(&mut self.id);
        let name = std::mem::take(&mut self.name);
        handle.spawn(async move {
            if let Err(e) = runtime.remove_container(&id).await {
                warn!(container = %name, error = %e, "Best-effort removal failed");
            }
        });
    }
}
