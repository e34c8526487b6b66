//! flotilla scheduler
//!
//! The scheduler drives the set of jobs observed running on a pool of hosts
//! toward the formations declared in the controller. It reconciles three
//! independent sources of truth — declared formations, its own in-memory
//! view, and per-host live jobs — in the presence of drift and partial
//! failures.
//!
//! ## Architecture
//!
//! One actor owns all mutable state and drains five work queues in strict
//! priority order, so every invariant is a single-threaded invariant:
//!
//! ```text
//! job requests ─┐
//! rectify ──────┤
//! formation Δ ──┼──▶ Scheduler (single-writer loop) ──▶ event bus
//! formation sync┤         │
//! job sync ─────┘         ▼
//!                controller / hosts
//! ```
//!
//! Local work (job requests, rectification) always finishes before global
//! state is re-read, which prevents livelock between a sync that enqueues
//! requests and a newer sync that would discard them.
//!
//! ## Modules
//!
//! - `scheduler`: the reconciliation loop and its handle
//! - `formation`, `job`: the data model
//! - `client`: collaborator contracts (controller, cluster, hosts, volumes)
//! - `event`: the event bus published to subscribers
//! - `testing`: in-memory fakes for tests and dev-cluster mode

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod formation;
pub mod job;
pub mod scheduler;
pub mod testing;

pub use client::{
    ActiveJob, App, Artifact, ClientError, ClusterClient, ControllerClient, DeclaredFormation,
    HostClient, HostJob, HostJobStatus, JobPut, JobState, ProcessSpec, Release, VolumeBinding,
    VolumeProvisioner, META_APP_ID, META_APP_NAME, META_PROCESS_TYPE, META_RELEASE_ID,
};
pub use config::{Config, SchedulerConfig};
pub use error::SchedulerError;
pub use event::{Event, EventKind, EventStream, EventStreamError};
pub use formation::{ExpandedFormation, Formation, FormationKey, Formations};
pub use job::{Job, JobRequest, RequestKind};
pub use scheduler::{Scheduler, SchedulerHandle};
