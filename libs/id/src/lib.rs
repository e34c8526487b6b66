//! # flotilla-id
//!
//! Typed identifiers for the resources the scheduler reconciles.
//!
//! Two families of IDs exist, matching who mints them:
//!
//! - **Controller-owned** resources (apps, releases, artifacts) carry
//!   prefixed ULIDs with a canonical string form `{prefix}_{ulid}`, e.g.
//!   `app_01HV4Z3MXNKPQR9HSTZ7WCLD4E`. These are system-generated, strictly
//!   parsed, time-ordered, and roundtrip through serialization.
//! - **Host-assigned** identifiers (jobs, hosts) are opaque strings. Hosts
//!   own the namespace; the scheduler must not assume any structure beyond
//!   non-emptiness.
//!
//! Typing prevents mixing resource kinds: a `ReleaseId` never flows into an
//! API that expects an `AppId`, and identifiers pulled out of job metadata
//! are parsed at the boundary rather than passed around as bare strings.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
