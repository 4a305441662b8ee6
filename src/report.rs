// Report building: select snapshot files by time pattern, merge them, write sorted JSON.

use std::io::Write;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::bucket::{DEFAULT_FILE_PREFIX, FILE_SUFFIX};
use crate::error::{Result, StatError};
use crate::merge::{self, ConflictPolicy};
use crate::models::{AggregateReport, CounterTree, Snapshot};

/// What to do with a snapshot file whose payload does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParseErrorPolicy {
    /// Leave it out, log a warning, list it in `AggregateReport::skipped`.
    #[default]
    Skip,
    Abort,
}

#[derive(Debug, Clone)]
pub struct ReportBuilder {
    file_prefix: String,
    conflict_policy: ConflictPolicy,
    on_parse_error: ParseErrorPolicy,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self {
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            conflict_policy: ConflictPolicy::default(),
            on_parse_error: ParseErrorPolicy::default(),
        }
    }
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn on_parse_error(mut self, policy: ParseErrorPolicy) -> Self {
        self.on_parse_error = policy;
        self
    }

    /// Files directly in `base_dir` named `<prefix><time_pattern>.stat`, sorted by name.
    pub fn matching_files(&self, base_dir: &Path, time_pattern: &str) -> Result<Vec<PathBuf>> {
        let re = file_pattern(&self.file_prefix, time_pattern)?;
        let entries = std::fs::read_dir(base_dir).map_err(|e| StatError::storage(base_dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StatError::storage(base_dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if re.is_match(name) && entry.path().is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Merges every matching snapshot into one tree. No matches gives an empty report.
    #[instrument(skip(self, base_dir), fields(operation = "build_report", base_dir = %base_dir.display()))]
    pub fn build(&self, base_dir: &Path, time_pattern: &str) -> Result<AggregateReport> {
        let files = self.matching_files(base_dir, time_pattern)?;
        let mut report = AggregateReport::default();

        for path in files {
            let snapshot = match Snapshot::load(&path, &self.file_prefix) {
                Ok(s) => s,
                Err(e @ StatError::Parse { .. }) => match self.on_parse_error {
                    ParseErrorPolicy::Abort => return Err(e),
                    ParseErrorPolicy::Skip => {
                        warn!(error = %e, "skipping unparsable snapshot");
                        report.skipped.push(path);
                        continue;
                    }
                },
                Err(e) => return Err(e),
            };
            let conflicts = merge::merge_into(&snapshot.tree, &mut report.tree, self.conflict_policy)?;
            for c in &conflicts {
                warn!(path = %path.display(), conflict = %c, "shape conflict");
            }
            report.conflicts.extend(conflicts);
            report.snapshots += 1;
        }

        info!(
            snapshots = report.snapshots,
            skipped = report.skipped.len(),
            conflicts = report.conflicts.len(),
            "report built"
        );
        Ok(report)
    }
}

/// Anchored regex for `<prefix><time_pattern>.stat`.
///
/// The time pattern is a shell glob: `*` matches any run of characters, `?` one
/// character, `[01]` or `[0-3]` one character of a set and `[!5]` one character
/// outside it. A `[` with no closing `]` is taken literally.
pub fn file_pattern(prefix: &str, time_pattern: &str) -> Result<Regex> {
    let mut re = String::from("^");
    re.push_str(&regex::escape(prefix));
    let chars: Vec<char> = time_pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                if let Some(len) = bracket_class(&chars[i..], &mut re) {
                    i += len;
                    continue;
                }
                re.push_str(r"\[");
            }
            c => re.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    re.push_str(&regex::escape(FILE_SUFFIX));
    re.push('$');
    Regex::new(&re).map_err(|e| StatError::Config(format!("time pattern {time_pattern:?}: {e}")))
}

/// Translates the glob class at the start of `chars` (which begins with `[`)
/// into `re`. Returns how many chars it consumed, or `None` if it is unterminated.
fn bracket_class(chars: &[char], re: &mut String) -> Option<usize> {
    let mut i = 1;
    let negated = matches!(chars.get(i), Some('!' | '^'));
    if negated {
        i += 1;
    }
    let start = i;
    // A `]` right after the opening bracket is a member, not the end.
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while chars.get(i)? != &']' {
        i += 1;
    }

    re.push('[');
    if negated {
        re.push('^');
    }
    for &c in &chars[start..i] {
        match c {
            '-' => re.push('-'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push(']');
    Some(i + 1)
}

/// Writes the tree as sorted, four-space-indented JSON to `output`, or stdout when `None`.
/// File output goes through a temp file in the same directory and is renamed on success,
/// so a failed run never leaves a partial report behind.
pub fn write_report(tree: &CounterTree, output: Option<&Path>) -> Result<()> {
    let json = tree
        .to_pretty_json()
        .map_err(|e| StatError::storage(output.unwrap_or(Path::new("<stdout>")), e.into()))?;

    match output {
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")
                .and_then(|_| stdout.flush())
                .map_err(|e| StatError::storage("<stdout>", e))
        }
        Some(path) => write_atomically(path, format!("{json}\n").as_bytes()),
    }
}

pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StatError::storage(dir, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| StatError::storage(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StatError::storage(path, e.error))?;
    Ok(())
}
