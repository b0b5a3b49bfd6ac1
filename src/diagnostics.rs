//! Host diagnostics: run the AMT info tool on an environment.
//!
//! The caller names an endpoint and nothing else. Image, container name and
//! command come from [`DiagnosticTask`](crate::config::DiagnosticTask),
//! which defaults to `ptrrd/openamt:rpc-go amtinfo`.

use crate::config::{EndpointId, RunnerConfig, Settings};
use crate::connection::RuntimeConnection;
use crate::error::Result;
use crate::runtime::ContainerRuntime;
use crate::task::{execute, TaskRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Response record of the diagnostic: which endpoint, and what the tool
/// printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostInfo {
    pub endpoint: EndpointId,
    pub text: String,
}

/// Resolves `endpoint`, connects to its engine and runs the diagnostic task.
///
/// The runtime connection is dropped before this returns, on every path.
pub async fn host_info(
    endpoint: EndpointId,
    settings: &Settings,
    cancel: &CancellationToken,
) -> Result<HostInfo> {
    info!(endpoint = %endpoint, "Host info requested");
    let host = settings.endpoints.resolve(endpoint)?;
    let connection = RuntimeConnection::open(host)?;
    host_info_on(connection.runtime(), endpoint, &settings.runner, cancel).await
}

/// Runs the diagnostic task on an already open runtime.
pub async fn host_info_on(
    runtime: &Arc<dyn ContainerRuntime>,
    endpoint: EndpointId,
    config: &RunnerConfig,
    cancel: &CancellationToken,
) -> Result<HostInfo> {
    let task = &config.diagnostic;
    let request = TaskRequest::new(
        task.image.as_str(),
        task.container_name.as_str(),
        task.command.iter().cloned(),
    );

    let result = execute(runtime, &request, config, cancel).await?;
    Ok(HostInfo {
        endpoint,
        text: result.output,
    })
}
