//! Reconciliation loop primitives.
//!
//! Pure arithmetic for converging observed state to declared state. The
//! scheduler owns the loop; this library owns the decisions that must be
//! deterministic and unit-testable in isolation:
//!
//! - **Process counts**: how many processes of each type a formation should
//!   run, and the signed difference between two such maps.
//! - **Grouping**: collapsing a set of observed jobs into per-formation
//!   counts.
//! - **Scale-down victim selection**: which running job to stop when a
//!   formation shrinks.
//!
//! # Invariants
//!
//! - All functions are deterministic given the same inputs.
//! - `BTreeMap` keys keep iteration order stable, so work derived from a
//!   diff is enqueued in a stable order.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use chrono::{DateTime, Utc};

/// Declared or observed process counts for one formation, keyed by process
/// type name. Counts are non-negative; a type scaled to zero is simply
/// absent.
pub type ProcessCounts = BTreeMap<String, u32>;

/// Computes the signed per-type delta that takes `current` to `desired`.
///
/// Positive entries mean "start this many", negative entries mean "stop this
/// many". Types with no net change are omitted, so an empty result means the
/// two maps agree.
pub fn diff_counts(current: &ProcessCounts, desired: &ProcessCounts) -> BTreeMap<String, i64> {
    let mut diff = BTreeMap::new();
    for (process_type, want) in desired {
        let have = current.get(process_type).copied().unwrap_or(0);
        let delta = i64::from(*want) - i64::from(have);
        if delta != 0 {
            diff.insert(process_type.clone(), delta);
        }
    }
    for (process_type, have) in current {
        if !desired.contains_key(process_type) && *have > 0 {
            diff.insert(process_type.clone(), -i64::from(*have));
        }
    }
    diff
}

/// Strips zero-count entries, the canonical form for stored counts.
///
/// Declared input may spell "none" as an explicit `web: 0`; observed counts
/// never contain zeros. Canonicalizing before storage keeps the two
/// comparable with plain equality.
pub fn canonical_counts(mut counts: ProcessCounts) -> ProcessCounts {
    counts.retain(|_, n| *n > 0);
    counts
}

/// Groups `(group key, process type)` pairs into per-group process counts.
///
/// Used to collapse the scheduler's observed jobs into the same shape as
/// declared formations so the two can be diffed.
pub fn group_counts<K, I>(items: I) -> HashMap<K, ProcessCounts>
where
    K: Eq + Hash,
    I: IntoIterator<Item = (K, String)>,
{
    let mut groups: HashMap<K, ProcessCounts> = HashMap::new();
    for (key, process_type) in items {
        *groups
            .entry(key)
            .or_default()
            .entry(process_type)
            .or_insert(0) += 1;
    }
    groups
}

/// Ranking of a scale-down candidate. Higher ranks are stopped first.
///
/// Ordering: most-loaded host, then youngest job, then the smaller ID wins
/// the final tie (`tie_break` compares reversed). Most-loaded-first is the
/// inverse of least-loaded placement, so repeated scale up/down cycles do
/// not concentrate jobs on one host; youngest-first keeps long-lived warm
/// processes alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainRank {
    /// Number of same-type jobs on the candidate's host.
    pub host_load: usize,
    /// When the candidate started.
    pub started_at: DateTime<Utc>,
    /// Deterministic final tie-breaker, normally the job ID.
    pub tie_break: String,
}

impl Ord for DrainRank {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.host_load
            .cmp(&other.host_load)
            .then_with(|| self.started_at.cmp(&other.started_at))
            .then_with(|| other.tie_break.cmp(&self.tie_break))
    }
}

impl PartialOrd for DrainRank {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Picks the candidate to stop when scaling down: the one with the highest
/// [`DrainRank`]. Returns `None` when there is nothing to stop.
pub fn select_scale_down_victim<T>(candidates: Vec<(DrainRank, T)>) -> Option<T> {
    candidates
        .into_iter()
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, value)| value)
}
