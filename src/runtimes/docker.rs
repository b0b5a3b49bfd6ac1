//! # Docker Runtime - Docker Engine API via bollard
//!
//! Implements the [`ContainerRuntime`] trait against a Docker (or
//! API-compatible) engine, local or remote.
//!
//! ## Primitive Mapping
//!
//! | Primitive            | Engine API                                  |
//! |----------------------|---------------------------------------------|
//! | `pull_image`         | `POST /images/create` (progress stream)     |
//! | `create_container`   | `POST /containers/create?name=`             |
//! | `start_container`    | `POST /containers/{id}/start`               |
//! | `wait_container`     | `POST /containers/{id}/wait?condition=not-running` |
//! | `container_logs`     | `GET /containers/{id}/logs` (not following) |
//! | `remove_container`   | `DELETE /containers/{id}?force=true`        |
//!
//! ## Exit Codes
//!
//! bollard reports a nonzero exit from the wait endpoint as an error item.
//! That case is still a terminal status, so it is delivered on the status
//! channel of the [`ContainerWait`], not the error channel.
//!
//! [`ContainerRuntime`]: crate::runtime::ContainerRuntime

use crate::connection::TargetHost;
use crate::constants::{DEFAULT_IMAGE_TAG, ENGINE_API_TIMEOUT};
use crate::error::{Error, Result};
use crate::runtime::{
    ContainerRuntime, ContainerSpec, ContainerWait, LogStream, PullProgress, PullStream,
    RuntimeError, RuntimeResult,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{CreateImageInfo, HostConfig};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use tracing::{debug, info};

type BollardResult<T> = std::result::Result<T, BollardError>;

impl From<BollardError> for RuntimeError {
    fn from(err: BollardError) -> Self {
        match err {
            BollardError::DockerResponseServerError {
                status_code,
                message,
            } => RuntimeError::with_status(status_code, message),
            other => RuntimeError::new(other.to_string()),
        }
    }
}

/// Docker Engine runtime.
///
/// Cheap to clone: the underlying client shares one connection pool.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Builds a client for `host`.
    ///
    /// No request is made here; an unreachable engine surfaces on the first
    /// operation.
    pub fn connect(host: &TargetHost) -> Result<Self> {
        let timeout = ENGINE_API_TIMEOUT.as_secs();
        let connected = match host {
            TargetHost::Local => {
                Docker::connect_with_local_defaults().map(|d| d.with_timeout(ENGINE_API_TIMEOUT))
            }
            TargetHost::Unix(path) => {
                Docker::connect_with_socket(&path.to_string_lossy(), timeout, API_DEFAULT_VERSION)
            }
            TargetHost::Tcp(url) => Docker::connect_with_http(url, timeout, API_DEFAULT_VERSION),
        };

        let docker = connected.map_err(|e| Error::ConnectionFailed {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { docker })
    }

    /// Wraps an existing bollard client.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

/// Splits a reference into the `fromImage` and `tag` query parameters.
///
/// An empty tag makes the engine pull every tag of the repository, so a
/// reference without tag or digest gets [`DEFAULT_IMAGE_TAG`].
pub(crate) fn split_reference(reference: &str) -> (&str, &str) {
    if let Some((repository, digest)) = reference.split_once('@') {
        return (repository, digest);
    }

    let name_start = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (&reference[..split], &reference[split + 1..])
        }
        None => (reference, DEFAULT_IMAGE_TAG),
    }
}

fn progress_from_info(item: BollardResult<CreateImageInfo>) -> RuntimeResult<PullProgress> {
    let info = item?;
    if let Some(message) = info.error {
        return Err(RuntimeError::new(message));
    }
    Ok(PullProgress {
        id: info.id,
        status: info.status,
        progress: info.progress,
    })
}

/// Log query for a stopped task container.
///
/// Under a TTY the engine already merges stderr into stdout; asking for both
/// keeps stderr when the container was created without one.
fn log_options() -> LogsOptions<String> {
    LogsOptions {
        stdout: true,
        stderr: true,
        follow: false,
        ..Default::default()
    }
}

fn log_bytes(item: BollardResult<LogOutput>) -> RuntimeResult<Vec<u8>> {
    Ok(item?.into_bytes().to_vec())
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    fn pull_image(&self, reference: &str) -> PullStream {
        let (from_image, tag) = split_reference(reference);
        debug!(image = %from_image, tag = %tag, "Requesting image pull");

        let options = CreateImageOptions {
            from_image: from_image.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };

        let stream = self.docker.create_image(Some(options), None, None);
        Box::pin(stream.map(progress_from_info))
    }

    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> RuntimeResult<String> {
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            env: Some(spec.env.clone()),
            tty: Some(spec.tty),
            open_stdin: Some(spec.open_stdin),
            attach_stdout: Some(spec.attach_stdout),
            attach_stderr: Some(spec.attach_stderr),
            host_config: Some(HostConfig {
                privileged: Some(spec.privileged),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            debug!(container = %name, warning = %warning, "Engine warning on create");
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> RuntimeResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    fn wait_container(&self, id: &str) -> ContainerWait {
        let (senders, wait) = ContainerWait::channel();
        let docker = self.docker.clone();
        let id = id.to_string();

        let driver = tokio::spawn(async move {
            let options = WaitContainerOptions {
                condition: "not-running",
            };
            let mut stream = docker.wait_container(&id, Some(options));
            match stream.next().await {
                Some(Ok(response)) => senders.exited(response.status_code),
                Some(Err(BollardError::DockerContainerWaitError { code, .. })) => {
                    senders.exited(code)
                }
                Some(Err(e)) => senders.failed(e.into()),
                None => senders.failed(RuntimeError::new("wait stream ended without a status")),
            }
        });

        wait.with_driver(driver)
    }

    fn container_logs(&self, id: &str) -> LogStream {
        let stream = self.docker.logs(id, Some(log_options()));
        Box::pin(stream.map(log_bytes))
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => {
                info!(container_id = %id, "Removed container");
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 404,
                ..
            }) => {
                debug!(container_id = %id, "Container already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
