//! The reconciliation loop.
//!
//! One actor owns the job map, the formation collection, and the leadership
//! flag. Five work queues feed it, drained in strict priority order so local
//! work (job requests, rectification) always completes before global state
//! is re-read:
//!
//! 1. control (snapshots, leadership)
//! 2. job requests
//! 3. rectify
//! 4. formation changes
//! 5. formation sync
//! 6. job sync
//!
//! Handlers enqueue follow-up work through the same queues they are drained
//! from: a job sync ends by scheduling a rectify, a rectify emits formation
//! changes, and a formation change fans out job requests. Queue capacity
//! must therefore exceed the worst-case fan-out of a single sync.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use flotilla_id::{AppId, HostId, JobId, ReleaseId};
use flotilla_reconcile::{group_counts, select_scale_down_victim, DrainRank, ProcessCounts};

use crate::client::{
    App, ClientError, ClusterClient, ControllerClient, DeclaredFormation, HostClient, JobPut,
    JobState, VolumeProvisioner, META_APP_ID, META_PROCESS_TYPE, META_RELEASE_ID,
};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::event::{Event, EventKind, EventStream};
use crate::formation::{ExpandedFormation, Formation, FormationKey, Formations};
use crate::job::{Job, JobRequest, RequestKind};

/// Out-of-band requests serviced ahead of scale work, so introspection and
/// leadership changes never starve behind a burst of job requests.
enum ControlRequest {
    Jobs(oneshot::Sender<HashMap<JobId, Job>>),
    Formations(oneshot::Sender<HashMap<FormationKey, ProcessCounts>>),
    SetLeader(bool),
}

/// Senders for every queue the loop drains.
#[derive(Clone)]
struct Channels {
    control: mpsc::Sender<ControlRequest>,
    job_requests: mpsc::Sender<JobRequest>,
    rectify_jobs: mpsc::Sender<()>,
    formation_change: mpsc::Sender<ExpandedFormation>,
    formation_sync: mpsc::Sender<()>,
    job_sync: mpsc::Sender<()>,
}

/// The scheduler actor. Constructed with [`Scheduler::new`], consumed by
/// [`Scheduler::run`]; all interaction afterwards goes through the
/// [`SchedulerHandle`].
pub struct Scheduler {
    controller: Arc<dyn ControllerClient>,
    cluster: Arc<dyn ClusterClient>,
    volumes: Arc<dyn VolumeProvisioner>,
    config: SchedulerConfig,

    jobs: HashMap<JobId, Job>,
    formations: Formations,
    is_leader: bool,

    events: broadcast::Sender<Event>,
    tx: Channels,

    control_rx: mpsc::Receiver<ControlRequest>,
    job_requests_rx: mpsc::Receiver<JobRequest>,
    rectify_jobs_rx: mpsc::Receiver<()>,
    formation_change_rx: mpsc::Receiver<ExpandedFormation>,
    formation_sync_rx: mpsc::Receiver<()>,
    job_sync_rx: mpsc::Receiver<()>,
    stop_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        controller: Arc<dyn ControllerClient>,
        cluster: Arc<dyn ClusterClient>,
        volumes: Arc<dyn VolumeProvisioner>,
        config: SchedulerConfig,
    ) -> (Scheduler, SchedulerHandle) {
        let capacity = config.queue_capacity;
        let (control_tx, control_rx) = mpsc::channel(capacity);
        let (job_requests_tx, job_requests_rx) = mpsc::channel(capacity);
        let (rectify_jobs_tx, rectify_jobs_rx) = mpsc::channel(capacity);
        let (formation_change_tx, formation_change_rx) = mpsc::channel(capacity);
        let (formation_sync_tx, formation_sync_rx) = mpsc::channel(capacity);
        let (job_sync_tx, job_sync_rx) = mpsc::channel(capacity);
        let (events_tx, _) = broadcast::channel(config.event_capacity);
        let (stop_tx, stop_rx) = watch::channel(false);

        let tx = Channels {
            control: control_tx,
            job_requests: job_requests_tx,
            rectify_jobs: rectify_jobs_tx,
            formation_change: formation_change_tx,
            formation_sync: formation_sync_tx,
            job_sync: job_sync_tx,
        };

        let handle = SchedulerHandle {
            controller: controller.clone(),
            tx: tx.clone(),
            events: events_tx.clone(),
            stop: Arc::new(stop_tx),
        };

        let scheduler = Scheduler {
            controller,
            cluster,
            volumes,
            is_leader: config.leader,
            config,
            jobs: HashMap::new(),
            formations: Formations::new(),
            events: events_tx,
            tx,
            control_rx,
            job_requests_rx,
            rectify_jobs_rx,
            formation_change_rx,
            formation_sync_rx,
            job_sync_rx,
            stop_rx,
        };

        (scheduler, handle)
    }

    /// Runs the reconciliation loop until [`SchedulerHandle::stop`] is
    /// called. Both resyncs are kicked immediately so a fresh scheduler
    /// converges without waiting for a tick.
    pub async fn run(mut self) {
        info!(leader = self.is_leader, "Starting scheduler loop");
        self.spawn_tickers();

        let _ = self.tx.job_sync.try_send(());
        let _ = self.tx.formation_sync.try_send(());

        enum Wake {
            Stop,
            JobSync,
            Control(ControlRequest),
            Idle,
        }

        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            if let Ok(request) = self.control_rx.try_recv() {
                self.handle_control(request);
                continue;
            }
            if let Ok(request) = self.job_requests_rx.try_recv() {
                self.handle_job_request(request).await;
                continue;
            }
            if self.rectify_jobs_rx.try_recv().is_ok() {
                self.rectify_jobs().await;
                continue;
            }
            if let Ok(expanded) = self.formation_change_rx.try_recv() {
                self.formation_change(expanded);
                continue;
            }
            if self.formation_sync_rx.try_recv().is_ok() {
                self.sync_formations().await;
                continue;
            }
            if self.job_sync_rx.try_recv().is_ok() {
                self.sync_jobs().await;
                continue;
            }

            // Every queue is empty: park until a job sync or control message
            // arrives, or the idle deadline passes.
            let wake = tokio::select! {
                _ = self.stop_rx.changed() => Wake::Stop,
                received = self.job_sync_rx.recv() => match received {
                    Some(()) => Wake::JobSync,
                    None => Wake::Idle,
                },
                received = self.control_rx.recv() => match received {
                    Some(request) => Wake::Control(request),
                    None => Wake::Idle,
                },
                _ = tokio::time::sleep(self.config.idle_wait) => Wake::Idle,
            };

            match wake {
                Wake::Stop | Wake::Idle => {}
                Wake::JobSync => self.sync_jobs().await,
                Wake::Control(request) => self.handle_control(request),
            }
        }

        info!("Exiting scheduler loop");
    }

    /// Forwards timer ticks into the sync queues. `try_send` on purpose: a
    /// full queue means a sync is already pending, so ticks coalesce.
    fn spawn_tickers(&self) {
        let job_sync = self.tx.job_sync.clone();
        let formation_sync = self.tx.formation_sync.clone();
        let mut stop = self.stop_rx.clone();
        let job_interval = self.config.job_sync_interval;
        let formation_interval = self.config.formation_sync_interval;

        tokio::spawn(async move {
            let mut job_tick = tokio::time::interval(job_interval);
            let mut formation_tick = tokio::time::interval(formation_interval);
            // Skip the immediate first ticks; startup enqueues both syncs itself.
            job_tick.tick().await;
            formation_tick.tick().await;

            loop {
                tokio::select! {
                    _ = job_tick.tick() => {
                        let _ = job_sync.try_send(());
                    }
                    _ = formation_tick.tick() => {
                        let _ = formation_sync.try_send(());
                    }
                    _ = stop.changed() => {
                        if *stop.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn handle_control(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::Jobs(reply) => {
                let _ = reply.send(self.jobs.clone());
            }
            ControlRequest::Formations(reply) => {
                let _ = reply.send(self.formations.counts());
            }
            ControlRequest::SetLeader(leader) => {
                if self.is_leader != leader {
                    info!(leader, "Leadership changed");
                }
                self.is_leader = leader;
            }
        }
    }

    // ── Sync: observed state ────────────────────────────────────────

    async fn sync_jobs(&mut self) {
        drain_signals(&mut self.job_sync_rx);
        debug!("Starting cluster sync");

        let result = self.sync_jobs_pass().await;
        if let Err(err) = &result {
            error!(error = %err, "Cluster sync failed");
            self.enqueue_formation_sync();
        }
        self.send_event(Event::new(EventKind::ClusterSync, result.err()));
    }

    /// Pulls live jobs from every host and folds them into the local view:
    /// unknown active jobs with a known formation are adopted, orphans are
    /// refused, and jobs that vanished from the cluster are dropped.
    async fn sync_jobs_pass(&mut self) -> Result<(), SchedulerError> {
        let hosts = self.cluster.hosts().await.map_err(SchedulerError::Cluster)?;
        debug!(count = hosts.len(), "Got host list");

        let mut inactive: HashMap<JobId, Job> = self.jobs.clone();
        let mut sync_err: Option<SchedulerError> = None;
        let mut partial = false;

        for host in hosts {
            let host_id = host.id();
            let active = match host.list_jobs().await {
                Ok(jobs) => jobs,
                Err(err) => {
                    warn!(host.id = %host_id, error = %err, "Listing jobs failed, skipping host");
                    sync_err.get_or_insert(SchedulerError::Cluster(err));
                    partial = true;
                    continue;
                }
            };
            debug!(host.id = %host_id, count = active.len(), "Listed active jobs");

            for (job_id, active_job) in active {
                if !active_job.status.is_active() {
                    continue;
                }

                let metadata = &active_job.job.metadata;
                let app_id = metadata
                    .get(META_APP_ID)
                    .and_then(|s| s.parse::<AppId>().ok());
                let release_id = metadata
                    .get(META_RELEASE_ID)
                    .and_then(|s| s.parse::<ReleaseId>().ok());
                let (Some(app_id), Some(release_id)) = (app_id, release_id) else {
                    debug!(job.id = %job_id, "Skipping job without app or release metadata");
                    continue;
                };

                if self.jobs.contains_key(&job_id) {
                    inactive.remove(&job_id);
                    continue;
                }

                let key = FormationKey::new(&app_id, &release_id);
                let process_type = metadata
                    .get(META_PROCESS_TYPE)
                    .cloned()
                    .unwrap_or_default();

                let Some(formation) = self.formations.get(&key) else {
                    let err = SchedulerError::OrphanJob {
                        job_id: job_id.clone(),
                        formation: key,
                    };
                    warn!(job.id = %job_id, app.id = %app_id, release.id = %release_id, "Refusing to adopt orphan job");
                    sync_err.get_or_insert(err.clone());
                    self.send_event(Event::job_start(None, Some(err)));
                    continue;
                };

                let job = Job::new(formation, process_type, host_id.clone(), job_id);
                info!(job.id = %job.id, app.id = %app_id, release.id = %release_id, host.id = %host_id, "Adopting job");
                self.add_job(job.clone(), active_job.job.metadata.clone())
                    .await;
                self.send_event(Event::job_start(Some(job), None));
            }
        }

        // Whatever was not seen on any host no longer exists on the cluster.
        // Skipped when a host could not be listed: its jobs would all look
        // vanished and the drop would trigger spurious replacements.
        if !partial {
            for job_id in inactive.keys() {
                debug!(job.id = %job_id, "Dropping job no longer running on the cluster");
                self.jobs.remove(job_id);
            }
        }

        self.enqueue_rectify();

        match sync_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ── Sync: declared state ────────────────────────────────────────

    async fn sync_formations(&mut self) {
        drain_signals(&mut self.formation_sync_rx);
        debug!("Starting formation sync");

        let result = self.sync_formations_pass().await;
        if let Err(err) = &result {
            error!(error = %err, "Formation sync failed");
        }
        self.send_event(Event::new(EventKind::FormationSync, result.err()));
    }

    /// Pulls formations from the controller, but only when none are held:
    /// once the scheduler has formations, changes arrive as deltas and a
    /// re-pull would race them.
    async fn sync_formations_pass(&mut self) -> Result<(), SchedulerError> {
        if !self.formations.is_empty() {
            return Ok(());
        }

        let apps = self
            .controller
            .app_list()
            .await
            .map_err(SchedulerError::Controller)?;

        let mut first_err: Option<SchedulerError> = None;
        for app in apps {
            let declared = match self.controller.formation_list(&app.id).await {
                Ok(formations) => formations,
                Err(err) => {
                    warn!(app.id = %app.id, error = %err, "Listing formations failed");
                    first_err.get_or_insert(SchedulerError::Controller(err));
                    continue;
                }
            };
            for formation in declared {
                if let Err(err) = self.update_formation(formation, &app.name).await {
                    warn!(app.id = %app.id, error = %err, "Updating formation failed");
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Turns one declared formation into a formation-change. Known keys
    /// reuse the already-resolved descriptors; unknown keys resolve release
    /// and artifact through the controller first.
    async fn update_formation(
        &self,
        declared: DeclaredFormation,
        app_name: &str,
    ) -> Result<(), SchedulerError> {
        let key = FormationKey::new(&declared.app_id, &declared.release_id);

        let expanded = match self.formations.get(&key) {
            Some(local) => local.expanded_with(declared.processes),
            None => {
                let release = self
                    .controller
                    .get_release(&declared.release_id)
                    .await
                    .map_err(SchedulerError::Controller)?;
                let artifact = self
                    .controller
                    .get_artifact(&release.artifact_id)
                    .await
                    .map_err(SchedulerError::Controller)?;
                ExpandedFormation {
                    app: App {
                        id: declared.app_id,
                        name: app_name.to_string(),
                    },
                    release,
                    artifact,
                    processes: declared.processes,
                    updated_at: Utc::now(),
                }
            }
        };

        self.enqueue_formation_change(expanded);
        Ok(())
    }

    // ── Rectify ─────────────────────────────────────────────────────

    /// Computes drift between declared counts and the observed jobs. For
    /// every drifted formation the declared counts are overwritten with the
    /// observed ones and a formation-change carrying the *previous* declared
    /// counts is enqueued: the change handler then diffs observed → declared
    /// and issues exactly the requests that restore the declaration.
    async fn rectify_jobs(&mut self) {
        drain_signals(&mut self.rectify_jobs_rx);
        debug!("Rectifying jobs");

        let mut first_err: Option<SchedulerError> = None;

        let observed = group_counts(
            self.jobs
                .values()
                .map(|job| (job.formation_key(), job.process_type.clone())),
        );

        for (key, counts) in &observed {
            let Some(formation) = self.formations.get_mut(key) else {
                warn!(formation = %key, "Jobs exist without a formation");
                first_err.get_or_insert(SchedulerError::UnknownFormation(key.clone()));
                continue;
            };

            if &formation.processes != counts {
                info!(
                    formation = %key,
                    declared = ?formation.processes,
                    observed = ?counts,
                    "Rectifying process counts"
                );
                let previous = std::mem::replace(&mut formation.processes, counts.clone());
                let expanded = formation.expanded_with(previous);
                self.enqueue_formation_change(expanded);
            }
        }

        // Formations with no observed jobs at all: zero the local counts and
        // restore the declaration through the same diff path. Already-empty
        // formations stay untouched, a zero-to-zero change is a no-op.
        let mut restores = Vec::new();
        for (key, formation) in self.formations.iter_mut() {
            if observed.contains_key(key) || formation.processes.is_empty() {
                continue;
            }
            let previous = std::mem::take(&mut formation.processes);
            restores.push(formation.expanded_with(previous));
        }
        for expanded in restores {
            self.enqueue_formation_change(expanded);
        }

        if first_err.is_some() {
            self.enqueue_formation_sync();
        }
        self.send_event(Event::new(EventKind::RectifyJobs, first_err));
    }

    // ── Formation change ────────────────────────────────────────────

    /// Applies a new desired state to one formation and fans the per-type
    /// delta out as individual job requests.
    fn formation_change(&mut self, expanded: ExpandedFormation) {
        let key = expanded.key();

        let diff = match self.formations.get_mut(&key) {
            Some(formation) => formation.update(expanded.processes.clone()),
            None => {
                info!(formation = %key, "Creating formation");
                let formation = Formation::new(expanded);
                let diff = formation
                    .processes
                    .iter()
                    .map(|(process_type, count)| (process_type.clone(), i64::from(*count)))
                    .collect();
                self.formations.add(formation);
                diff
            }
        };

        for (process_type, delta) in diff {
            let kind = if delta > 0 {
                RequestKind::Up
            } else {
                RequestKind::Down
            };
            debug!(formation = %key, process_type = %process_type, delta, "Queueing scale requests");
            for _ in 0..delta.unsigned_abs() {
                self.enqueue_job_request(JobRequest::new(key.clone(), kind, process_type.clone()));
            }
        }

        self.send_event(Event::new(EventKind::FormationChange, None));
    }

    // ── Job requests ────────────────────────────────────────────────

    async fn handle_job_request(&mut self, request: JobRequest) {
        if !self.is_leader {
            debug!(
                formation = %request.formation,
                kind = ?request.kind,
                "Dropping job request, not leader"
            );
            return;
        }
        match request.kind {
            RequestKind::Up => self.start_job(request).await,
            RequestKind::Down => self.stop_job(request).await,
        }
    }

    async fn start_job(&mut self, request: JobRequest) {
        match self.start_job_inner(&request).await {
            Ok(job) => {
                info!(
                    job.id = %job.id,
                    host.id = %job.host_id,
                    process_type = %job.process_type,
                    "Started job"
                );
                self.send_event(Event::job_start(Some(job), None));
            }
            Err(err) => {
                error!(
                    formation = %request.formation,
                    process_type = %request.process_type,
                    error = %err,
                    "Failed to start job"
                );
                self.send_event(Event::job_start(None, Some(err)));
            }
        }
    }

    async fn start_job_inner(&mut self, request: &JobRequest) -> Result<Job, SchedulerError> {
        let host = self
            .find_best_host(&request.process_type, request.host_id.as_ref())
            .await?;
        let host_id = host.id();

        let (mut config, needs_volume, job) = {
            let formation = self
                .formations
                .get(&request.formation)
                .ok_or_else(|| SchedulerError::UnknownFormation(request.formation.clone()))?;
            let config = formation.host_job(&request.process_type, &host_id);
            let job = Job::new(
                formation,
                request.process_type.clone(),
                host_id.clone(),
                config.id.clone(),
            );
            (config, formation.needs_volume(&request.process_type), job)
        };

        if needs_volume {
            let binding = self
                .volumes
                .provision(&host_id)
                .await
                .map_err(SchedulerError::Volume)?;
            config.volumes.push(binding);
        }

        let metadata = config.metadata.clone();
        host.add_job(config).await.map_err(SchedulerError::Cluster)?;
        self.add_job(job.clone(), metadata).await;
        Ok(job)
    }

    async fn stop_job(&mut self, request: JobRequest) {
        match self.stop_job_inner(&request).await {
            Ok(job_id) => {
                info!(job.id = %job_id, formation = %request.formation, "Stopped job");
                self.send_event(Event::new(EventKind::JobStop, None));
            }
            Err(err) => {
                error!(
                    formation = %request.formation,
                    process_type = %request.process_type,
                    error = %err,
                    "Failed to stop job"
                );
                self.send_event(Event::new(EventKind::JobStop, Some(err)));
            }
        }
    }

    async fn stop_job_inner(&mut self, request: &JobRequest) -> Result<JobId, SchedulerError> {
        let (host_id, job_id) = match (&request.host_id, &request.job_id) {
            (Some(host_id), Some(job_id)) => (host_id.clone(), job_id.clone()),
            _ => self.select_stop_victim(&request.formation, &request.process_type)?,
        };

        let host = self.cluster.host(&host_id).await.map_err(|err| match err {
            ClientError::NotFound { .. } => SchedulerError::UnknownHost(host_id.clone()),
            other => SchedulerError::Cluster(other),
        })?;
        host.stop_job(&job_id)
            .await
            .map_err(SchedulerError::Cluster)?;
        self.remove_job(&job_id).await;
        Ok(job_id)
    }

    /// Picks which job a host-less, job-less down request stops: the
    /// youngest job of the requested type on the most-loaded host.
    fn select_stop_victim(
        &self,
        key: &FormationKey,
        process_type: &str,
    ) -> Result<(HostId, JobId), SchedulerError> {
        let loads = self.host_job_counts(process_type);
        let candidates = self
            .jobs
            .values()
            .filter(|job| job.process_type == process_type && &job.formation_key() == key)
            .map(|job| {
                let rank = DrainRank {
                    host_load: loads.get(&job.host_id).copied().unwrap_or(0),
                    started_at: job.started_at,
                    tie_break: job.id.to_string(),
                };
                (rank, (job.host_id.clone(), job.id.clone()))
            })
            .collect();

        select_scale_down_victim(candidates).ok_or_else(|| SchedulerError::NoStoppableJob {
            formation: key.clone(),
            process_type: process_type.to_string(),
        })
    }

    // ── Host selection ──────────────────────────────────────────────

    /// A pinned host wins; otherwise the host running the fewest jobs of
    /// this type, ties broken by iteration order.
    async fn find_best_host(
        &self,
        process_type: &str,
        host_id: Option<&HostId>,
    ) -> Result<Arc<dyn HostClient>, SchedulerError> {
        if let Some(id) = host_id {
            return self.cluster.host(id).await.map_err(|err| match err {
                ClientError::NotFound { .. } => SchedulerError::UnknownHost(id.clone()),
                other => SchedulerError::Cluster(other),
            });
        }

        let hosts = self.cluster.hosts().await.map_err(SchedulerError::Cluster)?;
        let counts = self.host_job_counts(process_type);

        let mut hosts = hosts.into_iter();
        let Some(first) = hosts.next() else {
            return Err(SchedulerError::NoHosts);
        };

        let mut best_count = counts.get(&first.id()).copied().unwrap_or(0);
        let mut best = first;
        for host in hosts {
            let count = counts.get(&host.id()).copied().unwrap_or(0);
            if count < best_count {
                best_count = count;
                best = host;
            }
        }
        Ok(best)
    }

    fn host_job_counts(&self, process_type: &str) -> HashMap<HostId, usize> {
        let mut counts = HashMap::new();
        for job in self.jobs.values() {
            if job.process_type != process_type {
                continue;
            }
            *counts.entry(job.host_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    // ── Local state + controller notification ───────────────────────

    /// Records a job locally and, as leader, reports it up to the
    /// controller. A failed report is logged, not fatal: the record is
    /// rewritten on the next placement change.
    async fn add_job(&mut self, job: Job, metadata: HashMap<String, String>) {
        self.jobs.insert(job.id.clone(), job.clone());
        if !self.is_leader {
            return;
        }
        let record = JobPut {
            job_id: job.id.clone(),
            app_id: job.app_id,
            release_id: job.release_id,
            process_type: job.process_type,
            host_id: job.host_id,
            state: JobState::Up,
            metadata,
        };
        if let Err(err) = self.controller.put_job(record).await {
            warn!(job.id = %job.id, error = %err, "Failed to record job with controller");
        }
    }

    async fn remove_job(&mut self, job_id: &JobId) {
        let Some(job) = self.jobs.get(job_id) else {
            return;
        };
        if self.is_leader {
            let record = JobPut {
                job_id: job.id.clone(),
                app_id: job.app_id,
                release_id: job.release_id,
                process_type: job.process_type.clone(),
                host_id: job.host_id.clone(),
                state: JobState::Down,
                metadata: HashMap::new(),
            };
            if let Err(err) = self.controller.put_job(record).await {
                warn!(job.id = %job_id, error = %err, "Failed to record job removal with controller");
            }
        }
        self.jobs.remove(job_id);
    }

    // ── Events + enqueues ───────────────────────────────────────────

    fn send_event(&self, event: Event) {
        debug!(
            event = %event.kind(),
            subscribers = self.events.receiver_count(),
            "Publishing event"
        );
        let _ = self.events.send(event);
    }

    fn enqueue_rectify(&self) {
        // Full queue means a rectify is already pending.
        let _ = self.tx.rectify_jobs.try_send(());
    }

    fn enqueue_formation_sync(&self) {
        let _ = self.tx.formation_sync.try_send(());
    }

    /// The actor is the only consumer of its own queues, so self-enqueues
    /// must never block: a full queue is dropped with a warning and the
    /// state converges on the next resync instead.
    fn enqueue_formation_change(&self, expanded: ExpandedFormation) {
        if self.tx.formation_change.try_send(expanded).is_err() {
            warn!("Formation change queue full, deferring to next sync");
        }
    }

    fn enqueue_job_request(&self, request: JobRequest) {
        let formation = request.formation.clone();
        if self.tx.job_requests.try_send(request).is_err() {
            warn!(
                formation = %formation,
                "Job request queue full, deferring to next rectify"
            );
        }
    }
}

/// Clonable handle to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    controller: Arc<dyn ControllerClient>,
    tx: Channels,
    events: broadcast::Sender<Event>,
    stop: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    /// Subscribes to the event bus. Events published before this call are
    /// not replayed.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Stops the loop. Idempotent; in-flight collaborator calls are not
    /// interrupted and the loop exits at its next top-of-iteration check.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Advises the scheduler of a leadership change.
    pub async fn change_leader(&self, leader: bool) {
        let _ = self
            .tx
            .control
            .send(ControlRequest::SetLeader(leader))
            .await;
    }

    /// Snapshot of the current job map, taken inside the actor's turn.
    /// Empty once the scheduler has stopped.
    pub async fn jobs(&self) -> HashMap<JobId, Job> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .control
            .send(ControlRequest::Jobs(reply_tx))
            .await
            .is_err()
        {
            return HashMap::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Snapshot of the declared process counts per formation.
    pub async fn formations(&self) -> HashMap<FormationKey, ProcessCounts> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .control
            .send(ControlRequest::Formations(reply_tx))
            .await
            .is_err()
        {
            return HashMap::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Asks the scheduler to recompute drift on its next turn. A full queue
    /// means a rectify is already pending, so the signal coalesces.
    pub fn rectify(&self) {
        let _ = self.tx.rectify_jobs.try_send(());
    }

    /// Declares a new desired state for one formation: forwards it to the
    /// controller, resolves the expanded form, and enqueues the change.
    pub async fn put_formation(&self, declared: DeclaredFormation) -> Result<(), SchedulerError> {
        self.controller
            .put_formation(declared.clone())
            .await
            .map_err(SchedulerError::Controller)?;

        let app = self
            .controller
            .get_app(&declared.app_id)
            .await
            .map_err(SchedulerError::Controller)?;
        let release = self
            .controller
            .get_release(&declared.release_id)
            .await
            .map_err(SchedulerError::Controller)?;
        let artifact = self
            .controller
            .get_artifact(&release.artifact_id)
            .await
            .map_err(SchedulerError::Controller)?;

        let expanded = ExpandedFormation {
            app,
            release,
            artifact,
            processes: declared.processes,
            updated_at: Utc::now(),
        };

        self.tx
            .formation_change
            .send(expanded)
            .await
            .map_err(|_| SchedulerError::Stopped)
    }

    /// Forwards an app registration to the controller.
    pub async fn create_app(&self, app: App) -> Result<(), SchedulerError> {
        self.controller
            .create_app(app)
            .await
            .map_err(SchedulerError::Controller)
    }

    /// Forwards a release to the controller.
    pub async fn create_release(&self, release: crate::client::Release) -> Result<(), SchedulerError> {
        self.controller
            .create_release(release)
            .await
            .map_err(SchedulerError::Controller)
    }

    /// Forwards an artifact to the controller.
    pub async fn create_artifact(
        &self,
        artifact: crate::client::Artifact,
    ) -> Result<(), SchedulerError> {
        self.controller
            .create_artifact(artifact)
            .await
            .map_err(SchedulerError::Controller)
    }
}

fn drain_signals(rx: &mut mpsc::Receiver<()>) {
    while rx.try_recv().is_ok() {}
}
