//! In-memory fakes for the scheduler's collaborators.
//!
//! Used by the test suites and by dev-cluster mode. Each fake keeps its
//! state behind a `Mutex`, exposes the inspection hooks the tests need, and
//! can be toggled to fail so error paths are reachable without a real
//! cluster.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use flotilla_id::{AppId, ArtifactId, HostId, JobId, ReleaseId};

use crate::client::{
    ActiveJob, App, Artifact, ClientError, ClusterClient, ControllerClient, DeclaredFormation,
    HostClient, HostJob, HostJobStatus, JobPut, JobState, Release, VolumeBinding,
    VolumeProvisioner,
};

// =============================================================================
// Controller
// =============================================================================

#[derive(Default)]
struct ControllerState {
    apps: HashMap<AppId, App>,
    releases: HashMap<ReleaseId, Release>,
    artifacts: HashMap<ArtifactId, Artifact>,
    formations: HashMap<(AppId, ReleaseId), DeclaredFormation>,
    job_records: Vec<JobPut>,
}

/// In-memory controller.
#[derive(Default)]
pub struct FakeControllerClient {
    state: Mutex<ControllerState>,
    fail_lists: AtomicBool,
}

impl FakeControllerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every list call fail until reset, simulating an unreachable
    /// controller.
    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Every placement record written for a job, in write order.
    pub fn job_states(&self, job_id: &JobId) -> Vec<JobState> {
        self.state
            .lock()
            .expect("controller state poisoned")
            .job_records
            .iter()
            .filter(|record| &record.job_id == job_id)
            .map(|record| record.state)
            .collect()
    }

    /// All placement records written so far.
    pub fn job_records(&self) -> Vec<JobPut> {
        self.state
            .lock()
            .expect("controller state poisoned")
            .job_records
            .clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControllerState> {
        self.state.lock().expect("controller state poisoned")
    }
}

#[async_trait]
impl ControllerClient for FakeControllerClient {
    async fn app_list(&self) -> Result<Vec<App>, ClientError> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable("controller offline".to_string()));
        }
        let mut apps: Vec<App> = self.lock().apps.values().cloned().collect();
        apps.sort_by_key(|app| app.id);
        Ok(apps)
    }

    async fn get_app(&self, id: &AppId) -> Result<App, ClientError> {
        self.lock()
            .apps
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::not_found("app", id))
    }

    async fn formation_list(&self, app_id: &AppId) -> Result<Vec<DeclaredFormation>, ClientError> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable("controller offline".to_string()));
        }
        let mut formations: Vec<DeclaredFormation> = self
            .lock()
            .formations
            .values()
            .filter(|formation| &formation.app_id == app_id)
            .cloned()
            .collect();
        formations.sort_by_key(|formation| formation.release_id);
        Ok(formations)
    }

    async fn get_release(&self, id: &ReleaseId) -> Result<Release, ClientError> {
        self.lock()
            .releases
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::not_found("release", id))
    }

    async fn get_artifact(&self, id: &ArtifactId) -> Result<Artifact, ClientError> {
        self.lock()
            .artifacts
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::not_found("artifact", id))
    }

    async fn put_job(&self, record: JobPut) -> Result<(), ClientError> {
        self.lock().job_records.push(record);
        Ok(())
    }

    async fn create_app(&self, app: App) -> Result<(), ClientError> {
        self.lock().apps.insert(app.id, app);
        Ok(())
    }

    async fn create_release(&self, release: Release) -> Result<(), ClientError> {
        self.lock().releases.insert(release.id, release);
        Ok(())
    }

    async fn create_artifact(&self, artifact: Artifact) -> Result<(), ClientError> {
        self.lock().artifacts.insert(artifact.id, artifact);
        Ok(())
    }

    async fn put_formation(&self, formation: DeclaredFormation) -> Result<(), ClientError> {
        self.lock()
            .formations
            .insert((formation.app_id, formation.release_id), formation);
        Ok(())
    }
}

// =============================================================================
// Host
// =============================================================================

/// In-memory worker node. Jobs added through the trait become `Starting`,
/// which counts as active for adoption.
pub struct FakeHostClient {
    id: HostId,
    jobs: Mutex<HashMap<JobId, ActiveJob>>,
    fail_adds: AtomicBool,
    fail_lists: AtomicBool,
}

impl FakeHostClient {
    pub fn new(id: HostId) -> Self {
        Self {
            id,
            jobs: Mutex::new(HashMap::new()),
            fail_adds: AtomicBool::new(false),
            fail_lists: AtomicBool::new(false),
        }
    }

    /// Makes `add_job` fail until reset.
    pub fn fail_adds(&self, fail: bool) {
        self.fail_adds.store(fail, Ordering::SeqCst);
    }

    /// Makes `list_jobs` fail until reset, simulating an unreachable host.
    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().expect("host state poisoned").len()
    }

    pub fn has_job(&self, id: &JobId) -> bool {
        self.jobs.lock().expect("host state poisoned").contains_key(id)
    }

    /// Drops a job without going through `stop_job`, simulating a job that
    /// vanished behind the scheduler's back.
    pub fn forget_job(&self, id: &JobId) {
        self.jobs.lock().expect("host state poisoned").remove(id);
    }
}

#[async_trait]
impl HostClient for FakeHostClient {
    fn id(&self) -> HostId {
        self.id.clone()
    }

    async fn list_jobs(&self) -> Result<HashMap<JobId, ActiveJob>, ClientError> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable(format!("host {} offline", self.id)));
        }
        Ok(self.jobs.lock().expect("host state poisoned").clone())
    }

    async fn add_job(&self, job: HostJob) -> Result<(), ClientError> {
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable(format!(
                "host {} refusing jobs",
                self.id
            )));
        }
        self.jobs.lock().expect("host state poisoned").insert(
            job.id.clone(),
            ActiveJob {
                job,
                status: HostJobStatus::Starting,
            },
        );
        Ok(())
    }

    async fn stop_job(&self, id: &JobId) -> Result<(), ClientError> {
        self.jobs
            .lock()
            .expect("host state poisoned")
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("job", id))
    }
}

// =============================================================================
// Cluster
// =============================================================================

/// In-memory fleet directory over a set of [`FakeHostClient`]s.
#[derive(Default)]
pub struct FakeCluster {
    hosts: Mutex<HashMap<HostId, Arc<FakeHostClient>>>,
    fail_hosts: AtomicBool,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_host(&self, host: Arc<FakeHostClient>) {
        self.hosts
            .lock()
            .expect("cluster state poisoned")
            .insert(host.id.clone(), host);
    }

    /// Makes `hosts` fail until reset, simulating an unreachable fleet
    /// directory.
    pub fn fail_hosts(&self, fail: bool) {
        self.fail_hosts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn hosts(&self) -> Result<Vec<Arc<dyn HostClient>>, ClientError> {
        if self.fail_hosts.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable("cluster offline".to_string()));
        }
        let hosts = self.hosts.lock().expect("cluster state poisoned");
        let mut sorted: Vec<Arc<FakeHostClient>> = hosts.values().cloned().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sorted
            .into_iter()
            .map(|host| host as Arc<dyn HostClient>)
            .collect())
    }

    async fn host(&self, id: &HostId) -> Result<Arc<dyn HostClient>, ClientError> {
        self.hosts
            .lock()
            .expect("cluster state poisoned")
            .get(id)
            .cloned()
            .map(|host| host as Arc<dyn HostClient>)
            .ok_or_else(|| ClientError::not_found("host", id))
    }
}

// =============================================================================
// Volumes
// =============================================================================

/// Counts provisions and hands out sequentially numbered volumes.
#[derive(Default)]
pub struct FakeVolumeProvisioner {
    counter: AtomicU64,
    fail: AtomicBool,
}

impl FakeVolumeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `provision` fail until reset.
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn provision_count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VolumeProvisioner for FakeVolumeProvisioner {
    async fn provision(&self, host_id: &HostId) -> Result<VolumeBinding, ClientError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable(
                "volume provisioner offline".to_string(),
            ));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(VolumeBinding {
            volume_id: format!("vol-{}-{}", host_id, n),
            target: "/data".to_string(),
            writeable: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn host_job(id: &str) -> HostJob {
        HostJob {
            id: JobId::new(id).unwrap(),
            artifact_uri: "docker://demo".to_string(),
            cmd: vec![],
            env: HashMap::new(),
            metadata: HashMap::new(),
            volumes: vec![],
        }
    }

    #[tokio::test]
    async fn test_fake_host_add_list_stop() {
        let host = FakeHostClient::new(HostId::new("host-1").unwrap());
        host.add_job(host_job("j1")).await.unwrap();

        let jobs = host.list_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(
            jobs[&JobId::new("j1").unwrap()].status,
            HostJobStatus::Starting
        );

        host.stop_job(&JobId::new("j1").unwrap()).await.unwrap();
        assert_eq!(host.job_count(), 0);

        let missing = host.stop_job(&JobId::new("j1").unwrap()).await;
        assert!(matches!(missing, Err(ClientError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_fake_host_failure_toggles() {
        let host = FakeHostClient::new(HostId::new("host-1").unwrap());

        host.fail_adds(true);
        assert!(host.add_job(host_job("j1")).await.is_err());
        host.fail_adds(false);
        assert!(host.add_job(host_job("j1")).await.is_ok());

        host.fail_lists(true);
        assert!(host.list_jobs().await.is_err());
    }

    #[tokio::test]
    async fn test_fake_cluster_lookup() {
        let cluster = FakeCluster::new();
        let id = HostId::new("host-1").unwrap();
        cluster.add_host(Arc::new(FakeHostClient::new(id.clone())));

        assert_eq!(cluster.hosts().await.unwrap().len(), 1);
        assert_eq!(cluster.host(&id).await.unwrap().id(), id);

        let unknown = HostId::new("host-9").unwrap();
        assert!(matches!(
            cluster.host(&unknown).await,
            Err(ClientError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_fake_controller_records_job_states() {
        let controller = FakeControllerClient::new();
        let job_id = JobId::new("j1").unwrap();
        let host_id = HostId::new("host-1").unwrap();
        let app_id = AppId::new();
        let release_id = ReleaseId::new();

        for state in [JobState::Up, JobState::Down] {
            controller
                .put_job(JobPut {
                    job_id: job_id.clone(),
                    app_id,
                    release_id,
                    process_type: "web".to_string(),
                    host_id: host_id.clone(),
                    state,
                    metadata: HashMap::new(),
                })
                .await
                .unwrap();
        }

        assert_eq!(controller.job_states(&job_id), vec![JobState::Up, JobState::Down]);
        assert!(controller.job_states(&JobId::new("other").unwrap()).is_empty());
    }

    #[tokio::test]
    async fn test_fake_volume_provisioner_counts() {
        let volumes = FakeVolumeProvisioner::new();
        let host = HostId::new("host-1").unwrap();

        let binding = volumes.provision(&host).await.unwrap();
        assert_eq!(binding.target, "/data");
        assert!(binding.writeable);
        assert_eq!(volumes.provision_count(), 1);

        volumes.fail(true);
        assert!(volumes.provision(&host).await.is_err());
    }
}
