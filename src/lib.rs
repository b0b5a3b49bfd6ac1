//! # runonce
//!
//! **Ephemeral-Container Task Execution**
//!
//! This crate runs one short command in a fresh container on a container
//! engine, captures what it printed, and removes the container whatever the
//! outcome. It is meant for diagnostics and other one-off tasks, not for
//! long-running services.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                             runonce                                 │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  diagnostics::host_info(endpoint)                                   │
//! │        │  EndpointRegistry → TargetHost → RuntimeConnection         │
//! │        ▼                                                            │
//! │  ┌──────────────────────┐        ┌───────────────────────────────┐  │
//! │  │   Image Provisioner  │ ─────► │          Task Runner          │  │
//! │  │  pull + full drain   │        │ create → start → wait →       │  │
//! │  │                      │        │ collect → remove              │  │
//! │  └──────────┬───────────┘        └───────────────┬───────────────┘  │
//! │             └──────────────┬─────────────────────┘                  │
//! │                            ▼                                        │
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                  ContainerRuntime Trait                     │    │
//! │  │  pull_image │ create │ start │ wait │ logs │ remove         │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                      Runtime Backends                               │
//! │  ┌───────────────────────────────────────┐                          │
//! │  │ DockerRuntime (bollard)               │                          │
//! │  │ local socket │ unix:// │ tcp://       │                          │
//! │  └───────────────────────────────────────┘                          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **Full pull drain**: [`ensure_image`] returns only after the engine's
//!   progress stream has ended.
//! - **Cleanup**: once a container is created, removal is attempted before
//!   [`run_task`] returns, and is scheduled on drop if the run is abandoned.
//! - **Create failures are final**: a rejected create is surfaced as
//!   [`Error::CreateFailed`] with no retry and no cleanup.
//! - **Bounded waits**: the pull drain and the terminal wait honour a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken) and a
//!   deadline.
//!
//! # Example
//!
//! ```rust,ignore
//! use runonce::{execute_on, RunnerConfig, TargetHost, TaskRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> runonce::Result<()> {
//!     let request = TaskRequest::new("alpine:3.19", "uname-once", ["uname", "-a"]);
//!     let result = execute_on(
//!         &TargetHost::Local,
//!         &request,
//!         &RunnerConfig::default(),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//!     print!("{}", result.output);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod provision;
pub mod runtime;
pub mod runtimes;
pub mod task;

// Re-exports
pub use config::{DiagnosticTask, Endpoint, EndpointId, EndpointRegistry, RunnerConfig, Settings};
pub use connection::{RuntimeConnection, TargetHost};
pub use constants::*;
pub use diagnostics::{host_info, host_info_on, HostInfo};
pub use error::{Error, Result};
pub use provision::{ensure_image, PullSummary};
pub use runtime::{
    ContainerRuntime, ContainerSpec, ContainerWait, LogStream, PullProgress, PullStream,
    RuntimeError, RuntimeResult, WaitSenders, WaitStatus,
};
pub use runtimes::DockerRuntime;
pub use task::{execute, execute_on, run_task, TaskRequest, TaskResult};
