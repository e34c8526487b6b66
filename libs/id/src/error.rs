//! Validation errors for scheduler identifiers.

use thiserror::Error;

/// Why an identifier was rejected.
///
/// The two ID families fail differently: controller-owned IDs (`app_…`,
/// `rel_…`, `art_…`) are parsed strictly against their canonical
/// `{prefix}_{ulid}` form, while host-assigned identifiers are opaque and
/// can only be rejected for being blank.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The string names a different resource type than the caller asked
    /// for, e.g. a release ID handed to an app-ID parser.
    #[error("expected a '{expected}' ID, found prefix '{found}'")]
    WrongResource {
        expected: &'static str,
        found: String,
    },

    /// The string does not have the `{prefix}_{ulid}` shape at all.
    #[error("malformed ID '{0}', want '<prefix>_<ulid>'")]
    Malformed(String),

    /// The payload after the prefix is not a ULID.
    #[error("ID payload is not a ULID: {0}")]
    NotUlid(String),

    /// A host-assigned identifier (job or host) was blank. Hosts own those
    /// namespaces, but an empty string can never address anything.
    #[error("host-assigned identifier is blank")]
    Blank,
}
