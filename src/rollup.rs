// Rollup: fold the finer-grained files of one period into a single period file.
// Minute files roll into an hour file, hour files into a day file, and so on.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::bucket::Stamp;
use crate::error::{Result, StatError};
use crate::merge::{self, ConflictPolicy};
use crate::models::{CounterTree, ROLLUP_TAG, Snapshot};
use crate::report::write_atomically;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupOutcome {
    pub path: PathBuf,
    /// Child files merged on this run (an existing period file is not counted).
    pub merged: usize,
    pub removed: Vec<PathBuf>,
}

/// Merges the direct children of `period` into `<dir>/<prefix><period>.stat`,
/// then removes them.
///
/// Children are looked up both in `dir` itself and in its two-digit
/// subdirectories, so with the collector's `YYYY/MM/DD/HH` layout an hour is
/// rolled up in its `HH` directory and a day in its `DD` directory, picking up
/// each `HH/<prefix><YYYYMMDDHH>.stat`.
///
/// The period file header lists every stamp merged into it. A child whose
/// stamp is already listed is only removed, never merged again, so a run that
/// failed after writing the period file can simply be repeated.
///
/// Returns `Ok(None)` when there are no children. Nothing is written or
/// removed if any child fails to load or merge.
#[instrument(skip(dir, period, policy), fields(operation = "rollup", dir = %dir.display(), period = %period))]
pub fn rollup(
    dir: &Path,
    period: &Stamp,
    prefix: &str,
    policy: ConflictPolicy,
) -> Result<Option<RollupOutcome>> {
    let target = dir.join(period.file_name(prefix));
    let children = child_files(dir, period, prefix)?;
    if children.is_empty() {
        info!("nothing to roll up");
        return Ok(None);
    }

    let (mut tree, mut rolled_up) = if target.is_file() {
        let existing = Snapshot::load(&target, prefix)?;
        (existing.tree, existing.rolled_up.into_iter().collect())
    } else {
        (CounterTree::new(), BTreeSet::new())
    };

    let mut merged = 0;
    for (stamp, child) in &children {
        if rolled_up.contains(stamp) {
            warn!(path = %child.display(), "already rolled up, removing leftover");
            continue;
        }
        let snapshot = Snapshot::load(child, prefix)?;
        for c in merge::merge_into(&snapshot.tree, &mut tree, policy)? {
            warn!(path = %child.display(), conflict = %c, "shape conflict");
        }
        rolled_up.insert(stamp.clone());
        merged += 1;
    }

    if merged > 0 {
        let json = tree
            .to_pretty_json()
            .map_err(|e| StatError::storage(&target, e.into()))?;
        let stamps: Vec<&str> = rolled_up.iter().map(Stamp::as_str).collect();
        let contents = format!("{} {}\n{}\n", ROLLUP_TAG, stamps.join(" "), json);
        write_atomically(&target, contents.as_bytes())?;
    }

    let mut removed = Vec::with_capacity(children.len());
    for (_, child) in children {
        std::fs::remove_file(&child).map_err(|e| StatError::storage(&child, e))?;
        removed.push(child);
    }
    info!(path = %target.display(), merged, "rollup written");

    Ok(Some(RollupOutcome {
        path: target,
        merged,
        removed,
    }))
}

/// Child files of `period`, sorted by stamp. A file in a subdirectory only
/// counts when the subdirectory is named after the stamp's last two digits.
fn child_files(dir: &Path, period: &Stamp, prefix: &str) -> Result<Vec<(Stamp, PathBuf)>> {
    let mut children = Vec::new();
    collect_children(dir, period, prefix, None, &mut children)?;

    let entries = std::fs::read_dir(dir).map_err(|e| StatError::storage(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StatError::storage(dir, e))?;
        let name = entry.file_name();
        let Some(segment) = name.to_str() else {
            continue;
        };
        let two_digits = segment.len() == 2 && segment.bytes().all(|b| b.is_ascii_digit());
        if two_digits && entry.path().is_dir() {
            collect_children(&entry.path(), period, prefix, Some(segment), &mut children)?;
        }
    }

    children.sort();
    Ok(children)
}

fn collect_children(
    dir: &Path,
    period: &Stamp,
    prefix: &str,
    segment: Option<&str>,
    out: &mut Vec<(Stamp, PathBuf)>,
) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| StatError::storage(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StatError::storage(dir, e))?;
        let Some(stamp) = entry
            .file_name()
            .to_str()
            .and_then(|name| Stamp::from_file_name(name, prefix))
        else {
            continue;
        };
        let in_place = segment.is_none_or(|s| stamp.as_str().ends_with(s));
        if stamp.is_child_of(period) && in_place && entry.path().is_file() {
            out.push((stamp, entry.path()));
        }
    }
    Ok(())
}
