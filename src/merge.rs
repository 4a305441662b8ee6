// Recursive merge of counter trees: sum matching counters, union structure.

use serde::Deserialize;
use thiserror::Error;

use crate::models::{CounterTree, CounterValue, ValueKind};

/// What to do when the same key path is a counter in one tree and a subtree in the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Stop and return the conflict.
    #[default]
    FailFast,
    /// Replace the destination value with the source value.
    SourceWins,
    /// Keep the destination value.
    Skip,
}

/// Key path is `/`-joined since daemon keys are dotted addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shape conflict at {path}: existing {existing}, incoming {incoming}")]
pub struct MergeConflict {
    pub path: String,
    pub existing: ValueKind,
    pub incoming: ValueKind,
}

/// Merges `source` into `destination` in place.
///
/// Keys only in `destination` are untouched; keys only in `source` are copied.
/// Counters add with `i64::saturating_add`. `Null` is the identity: it never
/// overwrites a value and is replaced by any incoming value.
///
/// Returns the conflicts resolved under `SourceWins` or `Skip`; under
/// `FailFast` the first conflict is returned as the error and `destination`
/// may be partially merged.
pub fn merge_into(
    source: &CounterTree,
    destination: &mut CounterTree,
    policy: ConflictPolicy,
) -> Result<Vec<MergeConflict>, MergeConflict> {
    let mut conflicts = Vec::new();
    let mut path = Vec::new();
    merge_level(source, destination, policy, &mut path, &mut conflicts)?;
    Ok(conflicts)
}

/// Functional form: returns `destination` with `source` merged in, failing on any conflict.
pub fn merge(source: &CounterTree, mut destination: CounterTree) -> Result<CounterTree, MergeConflict> {
    merge_into(source, &mut destination, ConflictPolicy::FailFast)?;
    Ok(destination)
}

/// Folds trees left to right into an empty accumulator.
pub fn merge_all<'a, I>(
    trees: I,
    policy: ConflictPolicy,
) -> Result<(CounterTree, Vec<MergeConflict>), MergeConflict>
where
    I: IntoIterator<Item = &'a CounterTree>,
{
    let mut acc = CounterTree::new();
    let mut conflicts = Vec::new();
    for tree in trees {
        conflicts.extend(merge_into(tree, &mut acc, policy)?);
    }
    Ok((acc, conflicts))
}

fn merge_level<'a>(
    source: &'a CounterTree,
    destination: &mut CounterTree,
    policy: ConflictPolicy,
    path: &mut Vec<&'a str>,
    conflicts: &mut Vec<MergeConflict>,
) -> Result<(), MergeConflict> {
    for (key, incoming) in source.iter() {
        path.push(key);
        let result = match destination.get_mut(key) {
            None => {
                destination.insert(key.clone(), incoming.clone());
                Ok(())
            }
            Some(existing) => merge_value(incoming, existing, policy, path, conflicts),
        };
        path.pop();
        result?;
    }
    Ok(())
}

fn merge_value<'a>(
    incoming: &'a CounterValue,
    existing: &mut CounterValue,
    policy: ConflictPolicy,
    path: &mut Vec<&'a str>,
    conflicts: &mut Vec<MergeConflict>,
) -> Result<(), MergeConflict> {
    if matches!(incoming, CounterValue::Null) {
        return Ok(());
    }
    if matches!(existing, CounterValue::Null) {
        *existing = incoming.clone();
        return Ok(());
    }

    match (incoming, existing) {
        (CounterValue::Count(n), CounterValue::Count(total)) => {
            *total = total.saturating_add(*n);
        }
        (CounterValue::Tree(sub), CounterValue::Tree(dest)) => {
            merge_level(sub, dest, policy, path, conflicts)?;
        }
        (incoming, existing) => {
            let conflict = MergeConflict {
                path: path.join("/"),
                existing: existing.kind(),
                incoming: incoming.kind(),
            };
            match policy {
                ConflictPolicy::FailFast => return Err(conflict),
                ConflictPolicy::SourceWins => *existing = incoming.clone(),
                ConflictPolicy::Skip => {}
            }
            tracing::debug!(path = %conflict.path, ?policy, "merge conflict resolved");
            conflicts.push(conflict);
        }
    }
    Ok(())
}
