// Snapshot file: `#lastflush:` comment lines followed by raw `show` payloads.

use std::path::Path;

use crate::bucket::Stamp;
use crate::error::StatError;
use crate::merge::{self, ConflictPolicy};

use super::CounterTree;

pub const LAST_FLUSH_TAG: &str = "#lastflush:";
/// Header of a rolled-up period file, followed by the stamps of the merged files.
pub const ROLLUP_TAG: &str = "#rollup:";

/// One persisted collection result. A file collected twice in the same minute
/// holds two records; their trees are merged on load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub stamp: Option<Stamp>,
    pub last_flush: Vec<String>,
    /// Stamps already folded into this file by a rollup.
    pub rolled_up: Vec<Stamp>,
    pub tree: CounterTree,
}

impl Snapshot {
    /// Parses snapshot text. Lines starting with `#` separate records.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut last_flush = Vec::new();
        let mut rolled_up = Vec::new();
        let mut bodies = Vec::new();
        let mut body = String::new();

        for line in text.lines() {
            let comment = line.trim_start();
            if comment.starts_with('#') {
                if let Some(value) = comment.strip_prefix(LAST_FLUSH_TAG) {
                    last_flush.push(value.trim().to_string());
                } else if let Some(stamps) = comment.strip_prefix(ROLLUP_TAG) {
                    rolled_up.extend(stamps.split_whitespace().filter_map(|s| s.parse::<Stamp>().ok()));
                }
                if !body.trim().is_empty() {
                    bodies.push(std::mem::take(&mut body));
                }
                body.clear();
            } else {
                body.push_str(line);
                body.push('\n');
            }
        }
        if !body.trim().is_empty() {
            bodies.push(body);
        }
        if bodies.is_empty() {
            return Err("no counter payload".to_string());
        }

        let mut tree = CounterTree::new();
        for (i, body) in bodies.iter().enumerate() {
            let record = CounterTree::from_json(body)
                .map_err(|e| format!("record {}: {}", i + 1, e))?;
            merge::merge_into(&record, &mut tree, ConflictPolicy::FailFast)
                .map_err(|e| format!("record {}: {}", i + 1, e))?;
        }

        Ok(Self {
            stamp: None,
            last_flush,
            rolled_up,
            tree,
        })
    }

    /// Reads and parses a snapshot file; the stamp comes from its file name.
    /// Only I/O failures are storage errors; bad content, including invalid UTF-8, is a parse error.
    pub fn load(path: &Path, prefix: &str) -> Result<Self, StatError> {
        let parse_error = |reason: String| StatError::Parse {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = std::fs::read(path).map_err(|e| StatError::storage(path, e))?;
        let text = String::from_utf8(bytes).map_err(|e| parse_error(e.to_string()))?;
        let mut snapshot = Self::parse(&text).map_err(parse_error)?;
        snapshot.stamp = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| Stamp::from_file_name(n, prefix));
        Ok(snapshot)
    }

    /// Bytes appended to the snapshot file for one collection cycle.
    pub fn render_record(last_flush: &str, counters: &[u8]) -> Vec<u8> {
        let last_flush = last_flush
            .trim_matches(|c: char| c.is_whitespace() || c == '\0')
            .replace(['\r', '\n'], " ");
        let mut out = format!("{} {}\n", LAST_FLUSH_TAG, last_flush).into_bytes();
        out.extend_from_slice(counters);
        if !counters.ends_with(b"\n") {
            out.push(b'\n');
        }
        out
    }
}
