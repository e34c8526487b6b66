//! Error types for scheduler operations.

use thiserror::Error;

use flotilla_id::{HostId, JobId};

use crate::client::ClientError;
use crate::formation::FormationKey;

/// Errors raised by the reconciliation loop's handlers.
///
/// None of these abort the loop: transient collaborator failures are retried
/// by the next sync pass, and invariant violations are reported on the event
/// that closes the failing handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The cluster reported no hosts to place a job on.
    #[error("no hosts available")]
    NoHosts,

    /// A request named a host the cluster does not know.
    #[error("unknown host {0}")]
    UnknownHost(HostId),

    /// A host reported a job whose formation the scheduler does not hold.
    /// Orphans are never adopted.
    #[error("job {job_id} belongs to no known formation ({formation})")]
    OrphanJob {
        job_id: JobId,
        formation: FormationKey,
    },

    /// Work referenced a formation that is not in the collection.
    #[error("no formation for {0}")]
    UnknownFormation(FormationKey),

    /// A scale-down request found no running job of the requested type.
    #[error("no running {process_type} job to stop for {formation}")]
    NoStoppableJob {
        formation: FormationKey,
        process_type: String,
    },

    /// A controller request failed.
    #[error("controller request failed: {0}")]
    Controller(#[source] ClientError),

    /// A cluster or host request failed.
    #[error("cluster request failed: {0}")]
    Cluster(#[source] ClientError),

    /// Volume provisioning failed for a job that requires a data volume.
    #[error("volume provisioning failed: {0}")]
    Volume(#[source] ClientError),

    /// The scheduler has stopped and no longer accepts work.
    #[error("scheduler stopped")]
    Stopped,
}
