// Counter tree: nested string-keyed mapping of integer counters, as dumped by the daemon.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A node value. `Null` is what the daemon emits for a section with no traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CounterValue {
    Null,
    Count(i64),
    Tree(CounterTree),
}

impl CounterValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            CounterValue::Null => ValueKind::Null,
            CounterValue::Count(_) => ValueKind::Count,
            CounterValue::Tree(_) => ValueKind::Tree,
        }
    }

    pub fn as_count(&self) -> Option<i64> {
        match self {
            CounterValue::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&CounterTree> {
        match self {
            CounterValue::Tree(t) => Some(t),
            _ => None,
        }
    }
}

impl From<i64> for CounterValue {
    fn from(n: i64) -> Self {
        CounterValue::Count(n)
    }
}

impl From<CounterTree> for CounterValue {
    fn from(t: CounterTree) -> Self {
        CounterValue::Tree(t)
    }
}

/// Shape of a value, reported in merge conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Count,
    Tree,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Null => "null",
            ValueKind::Count => "counter",
            ValueKind::Tree => "subtree",
        })
    }
}

/// Keys are kept in a BTreeMap so serialization is always sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterTree(BTreeMap<String, CounterValue>);

impl CounterTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&CounterValue> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut CounterValue> {
        self.0.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<CounterValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CounterValue)> {
        self.0.iter()
    }

    /// Follows `path` through nested subtrees.
    pub fn get_path(&self, path: &[&str]) -> Option<&CounterValue> {
        let (last, parents) = path.split_last()?;
        let mut node = self;
        for key in parents {
            node = node.get(key)?.as_tree()?;
        }
        node.get(last)
    }

    /// Saturating sum of every counter in the tree.
    pub fn total(&self) -> i64 {
        self.0.values().fold(0i64, |acc, v| match v {
            CounterValue::Count(n) => acc.saturating_add(*n),
            CounterValue::Tree(t) => acc.saturating_add(t.total()),
            CounterValue::Null => acc,
        })
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Sorted keys, four-space indentation. Same input always gives the same bytes.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        // serde_json only emits valid UTF-8.
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

impl<K: Into<String>, V: Into<CounterValue>> FromIterator<(K, V)> for CounterTree {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for CounterTree {
    type Item = (String, CounterValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, CounterValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_daemon_nulls_and_nested_counters() {
        let tree = CounterTree::from_json(
            r#"{"v4": {"192.0.2.1": {"tcp_in": {"num": 3, "len": null}}}, "v6": null}"#,
        )
        .unwrap();
        assert_eq!(tree.get("v6"), Some(&CounterValue::Null));
        assert_eq!(
            tree.get_path(&["v4", "192.0.2.1", "tcp_in", "num"]),
            Some(&CounterValue::Count(3))
        );
        assert_eq!(tree.total(), 3);
    }

    #[test]
    fn rejects_non_counter_leaves() {
        assert!(CounterTree::from_json(r#"{"a": 1.5}"#).is_err());
        assert!(CounterTree::from_json(r#"{"a": "x"}"#).is_err());
        assert!(CounterTree::from_json(r#"{"a": [1]}"#).is_err());
        assert!(CounterTree::from_json("[1, 2]").is_err());
    }

    #[test]
    fn pretty_json_is_sorted_with_four_space_indent() {
        let tree: CounterTree = [("b", 2i64), ("a", 1i64)].into_iter().collect();
        assert_eq!(
            tree.to_pretty_json().unwrap(),
            "{\n    \"a\": 1,\n    \"b\": 2\n}"
        );
    }
}
