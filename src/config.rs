//! Runner settings and the endpoint registry.
//!
//! Settings are read from a JSON file. Every field is optional; omitted
//! fields fall back to the values in [`crate::constants`].
//!
//! ```json
//! {
//!   "runner": {
//!     "pull_timeout_secs": 300,
//!     "wait_timeout_secs": 600,
//!     "fail_on_nonzero_exit": false
//!   },
//!   "endpoints": [
//!     { "id": 1, "name": "local", "host": "unix:///var/run/docker.sock" },
//!     { "id": 2, "name": "edge-01", "host": "tcp://10.0.4.17:2375" }
//!   ]
//! }
//! ```

use crate::connection::TargetHost;
use crate::constants::{
    validate_container_name, validate_image_reference, AMT_INFO_COMMAND, AMT_INFO_CONTAINER_NAME,
    AMT_INFO_IMAGE, CONTAINER_REMOVE_TIMEOUT, CONTAINER_WAIT_TIMEOUT, IMAGE_PULL_TIMEOUT,
    MAX_COMMAND_ARGS,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Runner Settings
// =============================================================================

/// Timeouts and policy for task invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Bound on draining an image pull.
    pub pull_timeout_secs: u64,
    /// Bound on waiting for a task container to stop.
    pub wait_timeout_secs: u64,
    /// Bound on the cleanup removal.
    pub remove_timeout_secs: u64,
    /// Report a nonzero exit status as [`Error::NonZeroExit`] instead of
    /// returning the output.
    pub fail_on_nonzero_exit: bool,
    /// Definition of the host diagnostic task.
    pub diagnostic: DiagnosticTask,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pull_timeout_secs: IMAGE_PULL_TIMEOUT.as_secs(),
            wait_timeout_secs: CONTAINER_WAIT_TIMEOUT.as_secs(),
            remove_timeout_secs: CONTAINER_REMOVE_TIMEOUT.as_secs(),
            fail_on_nonzero_exit: false,
            diagnostic: DiagnosticTask::default(),
        }
    }
}

impl RunnerConfig {
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn remove_timeout(&self) -> Duration {
        Duration::from_secs(self.remove_timeout_secs)
    }

    /// Checks that timeouts are usable and the diagnostic task is well formed.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("pull_timeout_secs", self.pull_timeout_secs),
            ("wait_timeout_secs", self.wait_timeout_secs),
            ("remove_timeout_secs", self.remove_timeout_secs),
        ] {
            if value == 0 {
                return Err(Error::Config(format!(
                    "{} must be greater than zero",
                    field
                )));
            }
        }
        self.diagnostic.validate()
    }
}

/// The fixed image, container name and command of the host diagnostic.
///
/// Operators may point this at a mirror; end callers never choose it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticTask {
    pub image: String,
    pub container_name: String,
    pub command: Vec<String>,
}

impl Default for DiagnosticTask {
    fn default() -> Self {
        Self {
            image: AMT_INFO_IMAGE.to_string(),
            container_name: AMT_INFO_CONTAINER_NAME.to_string(),
            command: AMT_INFO_COMMAND.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DiagnosticTask {
    fn validate(&self) -> Result<()> {
        validate_image_reference(&self.image).map_err(|reason| {
            Error::Config(format!("diagnostic image '{}': {}", self.image, reason))
        })?;
        validate_container_name(&self.container_name).map_err(|reason| {
            Error::Config(format!(
                "diagnostic container name '{}': {}",
                self.container_name, reason
            ))
        })?;
        if self.command.len() > MAX_COMMAND_ARGS {
            return Err(Error::Config(format!(
                "diagnostic command has {} arguments (max {})",
                self.command.len(),
                MAX_COMMAND_ARGS
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Endpoints
// =============================================================================

/// Identifier of an environment whose engine can run tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub u32);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One registered environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    #[serde(default)]
    pub name: Option<String>,
    pub host: TargetHost,
}

/// Maps endpoint identifiers to target hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Endpoint>", into = "Vec<Endpoint>")]
pub struct EndpointRegistry {
    endpoints: BTreeMap<EndpointId, Endpoint>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint. Identifiers must be unique.
    pub fn insert(&mut self, endpoint: Endpoint) -> Result<()> {
        if self.endpoints.contains_key(&endpoint.id) {
            return Err(Error::Config(format!(
                "duplicate endpoint id {}",
                endpoint.id
            )));
        }
        self.endpoints.insert(endpoint.id, endpoint);
        Ok(())
    }

    /// Looks up an endpoint.
    pub fn get(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.get(&id)
    }

    /// Resolves an endpoint to the host its engine listens on.
    pub fn resolve(&self, id: EndpointId) -> Result<&TargetHost> {
        self.get(id)
            .map(|endpoint| &endpoint.host)
            .ok_or(Error::EndpointNotFound(id.0))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }
}

impl TryFrom<Vec<Endpoint>> for EndpointRegistry {
    type Error = Error;

    fn try_from(endpoints: Vec<Endpoint>) -> Result<Self> {
        let mut registry = Self::new();
        for endpoint in endpoints {
            registry.insert(endpoint)?;
        }
        Ok(registry)
    }
}

impl From<EndpointRegistry> for Vec<Endpoint> {
    fn from(registry: EndpointRegistry) -> Self {
        registry.endpoints.into_values().collect()
    }
}

// =============================================================================
// Settings File
// =============================================================================

/// Everything read from the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub runner: RunnerConfig,
    pub endpoints: EndpointRegistry,
}

impl Settings {
    /// Parses and validates settings from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(text)?;
        settings.runner.validate()?;
        Ok(settings)
    }

    /// Reads and validates a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}
