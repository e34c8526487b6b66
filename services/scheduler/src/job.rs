//! Jobs and the scale requests that create or remove them.

use chrono::{DateTime, Utc};

use flotilla_id::{AppId, HostId, JobId, ReleaseId};

use crate::formation::{Formation, FormationKey};

/// One running process instance on a host. Immutable once created; jobs are
/// replaced, never mutated.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub host_id: HostId,
    pub app_id: AppId,
    pub release_id: ReleaseId,
    pub process_type: String,

    /// When the scheduler first learned of this job (placement or adoption).
    /// Drives youngest-first scale-down selection.
    pub started_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        formation: &Formation,
        process_type: impl Into<String>,
        host_id: HostId,
        id: JobId,
    ) -> Self {
        Self {
            id,
            host_id,
            app_id: formation.app.id,
            release_id: formation.release.id,
            process_type: process_type.into(),
            started_at: Utc::now(),
        }
    }

    /// The formation this job belongs to.
    pub fn formation_key(&self) -> FormationKey {
        FormationKey::new(&self.app_id, &self.release_id)
    }
}

/// Direction of a scale request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Up,
    Down,
}

/// A unit of scale work: start or stop one process of one type.
///
/// `host_id` and `job_id` are `None` on requests produced by a formation
/// change; `stop_job` resolves a victim and `start_job` picks a host. A
/// caller that already knows the placement can pin either.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub formation: FormationKey,
    pub kind: RequestKind,
    pub process_type: String,
    pub host_id: Option<HostId>,
    pub job_id: Option<JobId>,
}

impl JobRequest {
    pub fn new(formation: FormationKey, kind: RequestKind, process_type: impl Into<String>) -> Self {
        Self {
            formation,
            kind,
            process_type: process_type.into(),
            host_id: None,
            job_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{App, Artifact, Release};
    use crate::formation::ExpandedFormation;
    use flotilla_id::ArtifactId;
    use std::collections::HashMap;

    #[test]
    fn test_job_formation_key_matches_its_formation() {
        let artifact = Artifact {
            id: ArtifactId::new(),
            uri: "docker://demo".to_string(),
        };
        let formation = Formation::new(ExpandedFormation {
            app: App {
                id: AppId::new(),
                name: "demo".to_string(),
            },
            release: Release {
                id: ReleaseId::new(),
                artifact_id: artifact.id,
                env: HashMap::new(),
                processes: HashMap::new(),
            },
            artifact,
            processes: Default::default(),
            updated_at: Utc::now(),
        });

        let host = HostId::new("host-1").unwrap();
        let job = Job::new(&formation, "web", host, JobId::generate(&HostId::new("host-1").unwrap()));

        assert_eq!(job.formation_key(), formation.key());
        assert_eq!(job.process_type, "web");
    }
}
