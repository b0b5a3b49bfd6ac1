//! # Image Provisioner
//!
//! Makes sure an image is present on the target runtime before a task runs.
//!
//! ## Full Drain
//!
//! The engine reports a pull as a stream of progress records. The pull is
//! only finished when that stream ends, and an engine may treat a pull whose
//! stream is dropped early as abandoned. [`ensure_image`] therefore reads the
//! stream to end-of-stream even though it only needs the fact of completion.
//!
//! ## Bounds
//!
//! - Reference validated against [`MAX_IMAGE_REF_LEN`] and the allowlist
//! - Drain bounded by a caller-supplied timeout (default [`IMAGE_PULL_TIMEOUT`])
//! - Drain aborted promptly when the cancellation token fires
//!
//! No retry happens here; retry policy belongs to the caller.
//!
//! ## Example
//!
//! ```rust,ignore
//! use runonce::{ensure_image, RuntimeConnection, TargetHost, IMAGE_PULL_TIMEOUT};
//! use tokio_util::sync::CancellationToken;
//!
//! let connection = RuntimeConnection::open(&TargetHost::Local)?;
//! let summary = ensure_image(
//!     connection.runtime().as_ref(),
//!     "alpine:3.19",
//!     IMAGE_PULL_TIMEOUT,
//!     &CancellationToken::new(),
//! )
//! .await?;
//! println!("pulled {} ({} progress events)", summary.reference, summary.events);
//! ```
//!
//! [`MAX_IMAGE_REF_LEN`]: crate::constants::MAX_IMAGE_REF_LEN
//! [`IMAGE_PULL_TIMEOUT`]: crate::constants::IMAGE_PULL_TIMEOUT

use crate::constants::validate_image_reference;
use crate::error::{Error, Result};
use crate::runtime::ContainerRuntime;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Outcome of a completed pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullSummary {
    /// Reference that was pulled.
    pub reference: String,
    /// Number of progress records read before end-of-stream.
    pub events: usize,
    /// Last status line the engine reported, if any.
    pub last_status: Option<String>,
}

/// Pulls `reference` on `runtime` and drains the progress stream.
///
/// # Errors
///
/// - [`Error::InvalidImageReference`] before contacting the runtime
/// - [`Error::PullFailed`] if any progress item is an error
/// - [`Error::Timeout`] if the stream does not end within `timeout`
/// - [`Error::Cancelled`] if `cancel` fires first
pub async fn ensure_image(
    runtime: &dyn ContainerRuntime,
    reference: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<PullSummary> {
    validate_image_reference(reference).map_err(|reason| Error::InvalidImageReference {
        reference: reference.to_string(),
        reason: reason.to_string(),
    })?;

    info!(image = %reference, runtime = runtime.name(), "Pulling image");

    let drain = async {
        let mut stream = runtime.pull_image(reference);
        let mut summary = PullSummary {
            reference: reference.to_string(),
            events: 0,
            last_status: None,
        };

        while let Some(item) = stream.next().await {
            let progress = item.map_err(|e| Error::PullFailed {
                reference: reference.to_string(),
                reason: e.to_string(),
            })?;
            summary.events += 1;

            if let Some(status) = progress.status {
                debug!(
                    image = %reference,
                    layer = progress.id.as_deref().unwrap_or(""),
                    status = %status,
                    "Pull progress"
                );
                summary.last_status = Some(status);
            }
        }

        Ok::<_, Error>(summary)
    };

    let summary = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(Error::Cancelled {
                operation: format!("pull image {}", reference),
            });
        }
        drained = tokio::time::timeout(timeout, drain) => {
            drained.map_err(|_| Error::Timeout {
                operation: format!("pull image {}", reference),
                duration: timeout,
            })??
        }
    };

    info!(image = %reference, events = summary.events, "Image available");
    Ok(summary)
}
