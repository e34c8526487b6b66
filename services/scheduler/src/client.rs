//! Collaborator contracts for the scheduler.
//!
//! The scheduler talks to three external systems, each behind a trait so
//! tests and dev-cluster mode can substitute in-memory fakes:
//!
//! - [`ControllerClient`]: the persistent source of declared state
//! - [`ClusterClient`] / [`HostClient`]: the fleet directory and the worker
//!   nodes it addresses
//! - [`VolumeProvisioner`]: data volumes for process types that request one
//!
//! The record types exchanged over these seams live here too.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use flotilla_id::{AppId, ArtifactId, HostId, JobId, ReleaseId};
use flotilla_reconcile::ProcessCounts;

/// Job metadata key carrying the app ID.
pub const META_APP_ID: &str = "flynn-controller.app";
/// Job metadata key carrying the app name.
pub const META_APP_NAME: &str = "flynn-controller.app_name";
/// Job metadata key carrying the release ID.
pub const META_RELEASE_ID: &str = "flynn-controller.release";
/// Job metadata key carrying the process type.
pub const META_PROCESS_TYPE: &str = "flynn-controller.type";

/// Errors surfaced by collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The requested resource does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The collaborator could not be reached or refused the request.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl ClientError {
    /// Shorthand for a typed not-found error.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

// =============================================================================
// Controller records
// =============================================================================

/// An application registered with the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: AppId,
    pub name: String,
}

/// The deployable artifact a release points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub uri: String,
}

/// Per-process-type launch configuration within a release.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Command to run.
    #[serde(default)]
    pub cmd: Vec<String>,

    /// Process-specific environment, merged over the release environment.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Whether instances of this type get a provisioned data volume.
    #[serde(default)]
    pub data: bool,
}

/// An immutable release of an app: artifact plus process definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,
    pub artifact_id: ArtifactId,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub processes: HashMap<String, ProcessSpec>,
}

/// A formation as declared in the controller: target process counts for one
/// (app, release) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredFormation {
    pub app_id: AppId,
    pub release_id: ReleaseId,

    #[serde(default)]
    pub processes: ProcessCounts,
}

/// Placement state reported back to the controller for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Up,
    Down,
}

/// Job record written to the controller on every placement change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPut {
    pub job_id: JobId,
    pub app_id: AppId,
    pub release_id: ReleaseId,
    pub process_type: String,
    pub host_id: HostId,
    pub state: JobState,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

// =============================================================================
// Host records
// =============================================================================

/// Lifecycle state a host reports for one of its jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostJobStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Crashed,
}

impl HostJobStatus {
    /// Whether the job counts toward a formation's running processes.
    pub fn is_active(&self) -> bool {
        matches!(self, HostJobStatus::Starting | HostJobStatus::Running)
    }
}

/// A data volume bound into a host job after provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeBinding {
    pub volume_id: String,
    pub target: String,
    pub writeable: bool,
}

/// The config handed to [`HostClient::add_job`]. The scheduler mints the job
/// ID ahead of the call so its view and the host agree on identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostJob {
    pub id: JobId,
    pub artifact_uri: String,
    pub cmd: Vec<String>,
    pub env: HashMap<String, String>,
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub volumes: Vec<VolumeBinding>,
}

/// One entry of a host's live job listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveJob {
    pub job: HostJob,
    pub status: HostJobStatus,
}

// =============================================================================
// Contracts
// =============================================================================

/// The persistent source of declared state.
#[async_trait]
pub trait ControllerClient: Send + Sync {
    async fn app_list(&self) -> Result<Vec<App>, ClientError>;

    async fn get_app(&self, id: &AppId) -> Result<App, ClientError>;

    async fn formation_list(&self, app_id: &AppId) -> Result<Vec<DeclaredFormation>, ClientError>;

    async fn get_release(&self, id: &ReleaseId) -> Result<Release, ClientError>;

    async fn get_artifact(&self, id: &ArtifactId) -> Result<Artifact, ClientError>;

    /// Records a placement change for a job.
    async fn put_job(&self, record: JobPut) -> Result<(), ClientError>;

    async fn create_app(&self, app: App) -> Result<(), ClientError>;

    async fn create_release(&self, release: Release) -> Result<(), ClientError>;

    async fn create_artifact(&self, artifact: Artifact) -> Result<(), ClientError>;

    async fn put_formation(&self, formation: DeclaredFormation) -> Result<(), ClientError>;
}

/// A single worker node.
#[async_trait]
pub trait HostClient: Send + Sync {
    fn id(&self) -> HostId;

    /// Lists the jobs the host currently knows about, active or not.
    async fn list_jobs(&self) -> Result<HashMap<JobId, ActiveJob>, ClientError>;

    async fn add_job(&self, job: HostJob) -> Result<(), ClientError>;

    async fn stop_job(&self, id: &JobId) -> Result<(), ClientError>;
}

/// The fleet directory.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn hosts(&self) -> Result<Vec<Arc<dyn HostClient>>, ClientError>;

    async fn host(&self, id: &HostId) -> Result<Arc<dyn HostClient>, ClientError>;
}

/// Provisions data volumes on hosts for process types that request one.
#[async_trait]
pub trait VolumeProvisioner: Send + Sync {
    async fn provision(&self, host_id: &HostId) -> Result<VolumeBinding, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_keys_are_wire_exact() {
        // Hosts tag jobs with these exact keys; adoption depends on them.
        assert_eq!(META_APP_ID, "flynn-controller.app");
        assert_eq!(META_APP_NAME, "flynn-controller.app_name");
        assert_eq!(META_RELEASE_ID, "flynn-controller.release");
        assert_eq!(META_PROCESS_TYPE, "flynn-controller.type");
    }

    #[test]
    fn test_active_statuses() {
        assert!(HostJobStatus::Starting.is_active());
        assert!(HostJobStatus::Running.is_active());
        assert!(!HostJobStatus::Stopping.is_active());
        assert!(!HostJobStatus::Stopped.is_active());
        assert!(!HostJobStatus::Crashed.is_active());
    }

    #[test]
    fn test_job_state_wire_names() {
        assert_eq!(serde_json::to_string(&JobState::Up).unwrap(), "\"up\"");
        assert_eq!(serde_json::to_string(&JobState::Down).unwrap(), "\"down\"");
    }
}
