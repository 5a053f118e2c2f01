//! The seam between the orchestrator and whatever runs plugin containers.

use async_trait::async_trait;
use feedrun_core::plugin::{PluginKind, ResourceLimits};
use feedrun_core::types::JobHandle;
use serde::Serialize;

use crate::error::ComputeError;

/// Everything a backend needs to start one plugin instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitRequest {
    /// Remote job id, unique per instance (`jid-{id}`).
    pub jid: String,
    pub image: String,
    pub entrypoint: Vec<String>,
    pub args: Vec<String>,
    #[serde(rename = "type")]
    pub kind: PluginKind,
    /// Storage path the backend stages into the container input dir.
    /// `None` runs the plugin against an empty input dir.
    pub input_dir: Option<String>,
    /// Storage path the container output dir is copied back to.
    pub output_dir: String,
    #[serde(flatten)]
    pub limits: ResourceLimits,
    /// Username the job runs on behalf of.
    pub auid: String,
}

/// Execution state reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Running,
    Succeeded,
    Failed { reason: Option<String> },
}

/// A remote compute service that runs plugin containers.
///
/// Calls may block on the network; implementations bound them with a
/// timeout and report it as [`ComputeError::Timeout`].
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Start a job and return the backend's handle for it.
    async fn submit(&self, request: &SubmitRequest) -> Result<JobHandle, ComputeError>;

    /// Report the current state of a previously submitted job.
    async fn poll(&self, handle: &JobHandle) -> Result<RemoteStatus, ComputeError>;

    /// Ask the backend to stop a job. Stopping a finished job is not an error.
    async fn cancel(&self, handle: &JobHandle) -> Result<(), ComputeError>;
}
