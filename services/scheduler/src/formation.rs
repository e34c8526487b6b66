//! Formations: the declared process counts for one (app, release) pair.
//!
//! A formation is created on the first change that mentions its key and is
//! never deleted; a formation scaled to all-zero stays in the collection so
//! later scale-ups reuse the same resolved app/release/artifact.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};

use flotilla_id::{AppId, HostId, JobId, ReleaseId};
use flotilla_reconcile::{canonical_counts, diff_counts, ProcessCounts};

use crate::client::{
    App, Artifact, HostJob, Release, META_APP_ID, META_APP_NAME, META_PROCESS_TYPE,
    META_RELEASE_ID,
};

/// Identity of a formation: one (app, release) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormationKey {
    pub app_id: AppId,
    pub release_id: ReleaseId,
}

impl FormationKey {
    pub fn new(app_id: &AppId, release_id: &ReleaseId) -> Self {
        Self {
            app_id: *app_id,
            release_id: *release_id,
        }
    }
}

impl fmt::Display for FormationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_id, self.release_id)
    }
}

/// A formation with app, release, and artifact fully resolved — the payload
/// of the formation-change queue and the shape used to create formations.
#[derive(Debug, Clone)]
pub struct ExpandedFormation {
    pub app: App,
    pub release: Release,
    pub artifact: Artifact,
    pub processes: ProcessCounts,
    pub updated_at: DateTime<Utc>,
}

impl ExpandedFormation {
    pub fn key(&self) -> FormationKey {
        FormationKey::new(&self.app.id, &self.release.id)
    }
}

/// The scheduler's record of one formation: resolved descriptors plus the
/// declared process counts.
#[derive(Debug, Clone)]
pub struct Formation {
    pub app: App,
    pub release: Release,
    pub artifact: Artifact,
    pub processes: ProcessCounts,
}

impl Formation {
    pub fn new(expanded: ExpandedFormation) -> Self {
        Self {
            app: expanded.app,
            release: expanded.release,
            artifact: expanded.artifact,
            processes: canonical_counts(expanded.processes),
        }
    }

    pub fn key(&self) -> FormationKey {
        FormationKey::new(&self.app.id, &self.release.id)
    }

    /// Replaces the declared counts, returning the signed per-type delta
    /// from the old counts to the new ones.
    pub fn update(&mut self, processes: ProcessCounts) -> BTreeMap<String, i64> {
        let diff = diff_counts(&self.processes, &processes);
        self.processes = canonical_counts(processes);
        diff
    }

    /// Re-expands this formation, carrying the given counts.
    pub fn expanded_with(&self, processes: ProcessCounts) -> ExpandedFormation {
        ExpandedFormation {
            app: self.app.clone(),
            release: self.release.clone(),
            artifact: self.artifact.clone(),
            processes,
            updated_at: Utc::now(),
        }
    }

    /// Whether starting a process of this type requires a data volume.
    pub fn needs_volume(&self, process_type: &str) -> bool {
        self.release
            .processes
            .get(process_type)
            .is_some_and(|spec| spec.data)
    }

    /// Builds the add-job config for one process of this formation on the
    /// given host, minting the job ID and stamping adoption metadata.
    pub fn host_job(&self, process_type: &str, host_id: &HostId) -> HostJob {
        let spec = self
            .release
            .processes
            .get(process_type)
            .cloned()
            .unwrap_or_default();

        let mut env = self.release.env.clone();
        env.extend(spec.env);

        let mut metadata = HashMap::new();
        metadata.insert(META_APP_ID.to_string(), self.app.id.to_string());
        metadata.insert(META_APP_NAME.to_string(), self.app.name.clone());
        metadata.insert(META_RELEASE_ID.to_string(), self.release.id.to_string());
        metadata.insert(META_PROCESS_TYPE.to_string(), process_type.to_string());

        HostJob {
            id: JobId::generate(host_id),
            artifact_uri: self.artifact.uri.clone(),
            cmd: spec.cmd,
            env,
            metadata,
            volumes: Vec::new(),
        }
    }
}

/// All formations known to the scheduler, keyed by (app, release).
///
/// Owned exclusively by the scheduler actor; keys are unique and entries are
/// never removed.
#[derive(Debug, Default)]
pub struct Formations {
    inner: HashMap<FormationKey, Formation>,
}

impl Formations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &FormationKey) -> Option<&Formation> {
        self.inner.get(key)
    }

    pub fn get_mut(&mut self, key: &FormationKey) -> Option<&mut Formation> {
        self.inner.get_mut(key)
    }

    /// Inserts a formation under its own key, returning a reference to it.
    pub fn add(&mut self, formation: Formation) -> &mut Formation {
        let key = formation.key();
        self.inner.entry(key).or_insert(formation)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&FormationKey, &mut Formation)> {
        self.inner.iter_mut()
    }

    /// Snapshot of the declared counts per formation.
    pub fn counts(&self) -> HashMap<FormationKey, ProcessCounts> {
        self.inner
            .iter()
            .map(|(key, formation)| (key.clone(), formation.processes.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ProcessSpec;
    use flotilla_id::ArtifactId;

    fn counts(pairs: &[(&str, u32)]) -> ProcessCounts {
        pairs.iter().map(|(t, n)| (t.to_string(), *n)).collect()
    }

    fn test_formation(processes: ProcessCounts) -> Formation {
        let artifact = Artifact {
            id: ArtifactId::new(),
            uri: "docker://registry.example.com/demo:1".to_string(),
        };
        let release = Release {
            id: ReleaseId::new(),
            artifact_id: artifact.id,
            env: HashMap::from([("GLOBAL".to_string(), "1".to_string())]),
            processes: HashMap::from([
                (
                    "web".to_string(),
                    ProcessSpec {
                        cmd: vec!["./web".to_string()],
                        env: HashMap::from([("PORT".to_string(), "8080".to_string())]),
                        data: false,
                    },
                ),
                (
                    "db".to_string(),
                    ProcessSpec {
                        cmd: vec!["./db".to_string()],
                        env: HashMap::new(),
                        data: true,
                    },
                ),
            ]),
        };
        Formation::new(ExpandedFormation {
            app: App {
                id: AppId::new(),
                name: "demo".to_string(),
            },
            release,
            artifact,
            processes,
            updated_at: Utc::now(),
        })
    }

    #[test]
    fn test_update_returns_signed_diff_and_replaces_counts() {
        let mut formation = test_formation(counts(&[("web", 1)]));

        let diff = formation.update(counts(&[("web", 3)]));
        assert_eq!(diff.get("web"), Some(&2));
        assert_eq!(formation.processes, counts(&[("web", 3)]));

        let diff = formation.update(counts(&[("web", 1)]));
        assert_eq!(diff.get("web"), Some(&-2));
        assert_eq!(formation.processes, counts(&[("web", 1)]));
    }

    #[test]
    fn test_counts_are_stored_canonically() {
        let mut formation = test_formation(counts(&[("web", 1), ("worker", 0)]));
        assert_eq!(formation.processes, counts(&[("web", 1)]));

        formation.update(counts(&[("web", 0)]));
        assert!(formation.processes.is_empty());
    }

    #[test]
    fn test_host_job_stamps_adoption_metadata() {
        let formation = test_formation(counts(&[("web", 1)]));
        let host = HostId::new("host-1").unwrap();

        let job = formation.host_job("web", &host);

        assert!(job.id.as_str().starts_with("host-1-"));
        assert_eq!(
            job.metadata.get(META_APP_ID),
            Some(&formation.app.id.to_string())
        );
        assert_eq!(job.metadata.get(META_APP_NAME), Some(&"demo".to_string()));
        assert_eq!(
            job.metadata.get(META_RELEASE_ID),
            Some(&formation.release.id.to_string())
        );
        assert_eq!(job.metadata.get(META_PROCESS_TYPE), Some(&"web".to_string()));
        assert_eq!(job.cmd, vec!["./web".to_string()]);
        // Process env overlays release env.
        assert_eq!(job.env.get("GLOBAL"), Some(&"1".to_string()));
        assert_eq!(job.env.get("PORT"), Some(&"8080".to_string()));
    }

    #[test]
    fn test_needs_volume_follows_process_spec() {
        let formation = test_formation(counts(&[("web", 1)]));
        assert!(!formation.needs_volume("web"));
        assert!(formation.needs_volume("db"));
        assert!(!formation.needs_volume("missing"));
    }

    #[test]
    fn test_formations_add_is_keyed_and_idempotent() {
        let mut formations = Formations::new();
        let formation = test_formation(counts(&[("web", 2)]));
        let key = formation.key();

        formations.add(formation.clone());
        formations.add(formation);
        assert_eq!(formations.len(), 1);
        assert_eq!(formations.get(&key).unwrap().processes, counts(&[("web", 2)]));
    }
}
