// Aggregate of several snapshots.

use std::path::PathBuf;

use crate::merge::MergeConflict;

use super::CounterTree;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateReport {
    pub tree: CounterTree,
    /// Snapshot files folded into `tree`.
    pub snapshots: usize,
    /// Files left out because they could not be parsed.
    pub skipped: Vec<PathBuf>,
    /// Shape conflicts resolved by a non-fail-fast policy.
    pub conflicts: Vec<MergeConflict>,
}
