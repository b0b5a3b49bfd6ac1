//! Target hosts and scoped runtime connections.
//!
//! A [`TargetHost`] says where a container engine listens. Opening it yields
//! a [`RuntimeConnection`], which is owned by exactly one invocation and is
//! released when dropped, on every exit path.

use crate::error::{Error, Result};
use crate::runtime::ContainerRuntime;
use crate::runtimes::DockerRuntime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Target Host
// =============================================================================

/// Address of a container engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetHost {
    /// The platform's default local engine endpoint.
    Local,
    /// A Unix domain socket.
    Unix(PathBuf),
    /// A TCP endpoint (`tcp://host:port` or `http://host:port`).
    Tcp(String),
}

impl FromStr for TargetHost {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidTargetHost {
            host: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }

        if let Some(path) = trimmed.strip_prefix("unix://") {
            if !path.starts_with('/') {
                return Err(invalid("socket path must be absolute"));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        for scheme in ["tcp://", "http://"] {
            if let Some(rest) = trimmed.strip_prefix(scheme) {
                if rest.is_empty() || rest.starts_with(':') || rest.starts_with('/') {
                    return Err(invalid("missing host name"));
                }
                return Ok(Self::Tcp(trimmed.to_string()));
            }
        }

        Err(invalid("expected 'local', unix://, tcp:// or http://"))
    }
}

impl TryFrom<String> for TargetHost {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TargetHost> for String {
    fn from(host: TargetHost) -> Self {
        host.to_string()
    }
}

impl fmt::Display for TargetHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(url) => write!(f, "{}", url),
        }
    }
}

// =============================================================================
// Runtime Connection
// =============================================================================

/// An open handle to a container runtime, scoped to one invocation.
pub struct RuntimeConnection {
    host: TargetHost,
    runtime: Arc<dyn ContainerRuntime>,
}

impl RuntimeConnection {
    /// Connects to the Docker engine at `host`.
    pub fn open(host: &TargetHost) -> Result<Self> {
        let runtime = DockerRuntime::connect(host)?;
        debug!(host = %host, "Opened runtime connection");
        Ok(Self::with_runtime(host.clone(), Arc::new(runtime)))
    }

    /// Wraps an already constructed runtime.
    pub fn with_runtime(host: TargetHost, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { host, runtime }
    }

    /// Returns the host this connection points at.
    pub fn host(&self) -> &TargetHost {
        &self.host
    }

    /// Returns the runtime behind this connection.
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }
}

impl fmt::Debug for RuntimeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConnection")
            .field("host", &self.host)
            .field("runtime", &self.runtime.name())
            .finish()
    }
}

impl Drop for RuntimeConnection {
    fn drop(&mut self) {
        debug!(host = %self.host, "Released runtime connection");
    }
}
