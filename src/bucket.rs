// Time bucketing: hour directories and minute-stamped snapshot file names.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Datelike, Local, Timelike};

use crate::error::StatError;

/// File name prefix used by the collector (`map646_<stamp>.stat`).
pub const DEFAULT_FILE_PREFIX: &str = "map646_";
pub const FILE_SUFFIX: &str = ".stat";

/// Minute-resolution bucket of a capture timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeBucket {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
}

impl TimeBucket {
    pub fn from_datetime<T: Datelike + Timelike>(ts: &T) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
            day: ts.day(),
            hour: ts.hour(),
            minute: ts.minute(),
        }
    }

    /// Bucket for the current local time.
    pub fn now() -> Self {
        Self::from_datetime(&Local::now())
    }

    /// Zero-padded year, month, day, hour, minute.
    pub fn components(&self) -> [String; 5] {
        [
            format!("{:04}", self.year),
            format!("{:02}", self.month),
            format!("{:02}", self.day),
            format!("{:02}", self.hour),
            format!("{:02}", self.minute),
        ]
    }

    /// Directory segments: year/month/day/hour. The minute only appears in the file name.
    pub fn path_segments(&self) -> Vec<String> {
        let [year, month, day, hour, _] = self.components();
        vec![year, month, day, hour]
    }

    /// All five components concatenated, e.g. `202301050907`.
    pub fn suffix(&self) -> String {
        self.components().concat()
    }

    pub fn dir_path(&self, base_dir: &Path) -> PathBuf {
        let mut dir = base_dir.to_path_buf();
        dir.extend(self.path_segments());
        dir
    }

    pub fn file_name(&self, prefix: &str) -> String {
        format!("{}{}{}", prefix, self.suffix(), FILE_SUFFIX)
    }

    /// `<base_dir>/<YYYY>/<MM>/<DD>/<HH>/<prefix><YYYYMMDDHHmm>.stat`
    pub fn file_path(&self, base_dir: &Path, prefix: &str) -> PathBuf {
        self.dir_path(base_dir).join(self.file_name(prefix))
    }

    pub fn stamp(&self) -> Stamp {
        Stamp {
            text: self.suffix(),
        }
    }
}

/// Pure form of the bucketing contract: (directory segments, file name suffix).
pub fn bucket<T: Datelike + Timelike>(ts: &T) -> (Vec<String>, String) {
    let b = TimeBucket::from_datetime(ts);
    (b.path_segments(), b.suffix())
}

/// A timestamp truncated to year, month, day, hour or minute precision
/// (4, 6, 8, 10 or 12 digits). Used to name rolled-up period files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp {
    text: String,
}

impl Stamp {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of digits: 4 (year) up to 12 (minute).
    pub fn precision(&self) -> usize {
        self.text.len()
    }

    /// True when `self` is exactly one level finer than `parent` and falls inside it.
    pub fn is_child_of(&self, parent: &Stamp) -> bool {
        self.precision() == parent.precision() + 2 && self.text.starts_with(&parent.text)
    }

    pub fn file_name(&self, prefix: &str) -> String {
        format!("{}{}{}", prefix, self.text, FILE_SUFFIX)
    }

    /// Extracts the stamp from `<prefix><stamp>.stat`; `None` for anything else.
    pub fn from_file_name(name: &str, prefix: &str) -> Option<Self> {
        let stamp = name.strip_prefix(prefix)?.strip_suffix(FILE_SUFFIX)?;
        stamp.parse().ok()
    }
}

impl FromStr for Stamp {
    type Err = StatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| StatError::Config(format!("invalid time stamp {s:?}: {why}"));

        if !matches!(s.len(), 4 | 6 | 8 | 10 | 12) {
            return Err(invalid("expected 4, 6, 8, 10 or 12 digits"));
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("not all digits"));
        }

        // Slices are ASCII digits, so the parses cannot fail.
        let field = |range: std::ops::Range<usize>| s[range].parse::<u32>().unwrap_or(0);
        let year = field(0..4);
        if !(1900..=3000).contains(&year) {
            return Err(invalid("year out of range"));
        }
        let checks: [(usize, std::ops::RangeInclusive<u32>, &str); 4] = [
            (4, 1..=12, "month out of range"),
            (6, 1..=31, "day out of range"),
            (8, 0..=23, "hour out of range"),
            (10, 0..=59, "minute out of range"),
        ];
        for (start, range, why) in checks {
            if s.len() > start && !range.contains(&field(start..start + 2)) {
                return Err(invalid(why));
            }
        }

        Ok(Self {
            text: s.to_string(),
        })
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
