//! Typed ID definitions for the scheduler's resources.
//!
//! Controller-owned resources use prefixed ULIDs; host-assigned identifiers
//! are opaque strings.

use crate::{define_id, define_opaque_id};

// =============================================================================
// Controller-owned resources
// =============================================================================

define_id!(AppId, "app");
define_id!(ReleaseId, "rel");
define_id!(ArtifactId, "art");

// =============================================================================
// Host-assigned identifiers
// =============================================================================

define_opaque_id!(HostId);
define_opaque_id!(JobId);

impl JobId {
    /// Mints a host-scoped job ID for a job the scheduler is about to place.
    ///
    /// Discovered jobs keep whatever ID their host reports; this is only for
    /// jobs the scheduler itself starts, where it picks the ID ahead of the
    /// `add_job` call.
    #[must_use]
    pub fn generate(host: &HostId) -> Self {
        Self(format!("{}-{}", host.as_str(), crate::Ulid::new()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_id_roundtrip() {
        let id = AppId::new();
        let s = id.to_string();
        let parsed: AppId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_app_id_prefix() {
        let id = AppId::new();
        assert!(id.to_string().starts_with("app_"));
    }

    #[test]
    fn test_app_id_rejects_other_resources() {
        let result: Result<AppId, _> = "rel_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::WrongResource {
                expected: "app",
                ..
            }
        ));
    }

    #[test]
    fn test_app_id_rejects_malformed_input() {
        for input in ["", "app01HV4Z2WQXKJNM8GPQY6VBKC3D", "no-separator-here"] {
            let result: Result<AppId, _> = input.parse();
            assert!(matches!(result.unwrap_err(), crate::IdError::Malformed(_)));
        }
    }

    #[test]
    fn test_app_id_rejects_non_ulid_payload() {
        let result: Result<AppId, _> = "app_invalid".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::NotUlid(_)));
    }

    #[test]
    fn test_app_id_json_roundtrip() {
        let id = AppId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: AppId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_release_id_sortable() {
        let id1 = ReleaseId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = ReleaseId::new();
        // ULIDs are time-ordered, so id1 < id2
        assert!(id1 < id2);
    }

    #[test]
    fn test_host_id_rejects_blank() {
        assert!(matches!(
            HostId::new("").unwrap_err(),
            crate::IdError::Blank
        ));
        assert!(HostId::new("host-1").is_ok());
    }

    #[test]
    fn test_job_id_is_opaque() {
        let id = JobId::new("anything goes: even spaces").unwrap();
        assert_eq!(id.as_str(), "anything goes: even spaces");
        assert_eq!(id.to_string(), "anything goes: even spaces");
    }

    #[test]
    fn test_job_id_json_roundtrip() {
        let id = JobId::new("web.1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"web.1\"");
        let parsed: JobId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_job_id_json_rejects_empty() {
        let parsed: Result<JobId, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_generated_job_ids_are_host_scoped_and_unique() {
        let host = HostId::new("host-1").unwrap();
        let a = JobId::generate(&host);
        let b = JobId::generate(&host);
        assert!(a.as_str().starts_with("host-1-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_all_id_prefixes_unique() {
        let prefixes = [AppId::PREFIX, ReleaseId::PREFIX, ArtifactId::PREFIX];
        let unique: std::collections::HashSet<_> = prefixes.iter().collect();
        assert_eq!(prefixes.len(), unique.len(), "duplicate ID prefixes");
    }
}
