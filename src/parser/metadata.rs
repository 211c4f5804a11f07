use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::MetadataError;

// 1457-4616_1854-01-07 → ISSN, year, month, day
static ISSUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{3}[\dXx])_(\d{4})-(\d{1,2})-(\d{1,2})").unwrap()
});

/// The (year, month, day, ISSN) key shared by every block of one printed issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueKey {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub issn: String,
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{} {}", self.year, self.month, self.day, self.issn)
    }
}

/// Derive the issue key from a page path. The last match in the path wins,
/// so a page file name takes precedence over its issue directory.
pub fn parse_from_path(path: &Path) -> Result<IssueKey, MetadataError> {
    let text = path.to_string_lossy();
    let caps = ISSUE_RE
        .captures_iter(&text)
        .last()
        .ok_or_else(|| MetadataError {
            path: path.to_path_buf(),
        })?;

    let number = |i: usize| -> Result<u32, MetadataError> {
        caps[i].parse().map_err(|_| MetadataError {
            path: path.to_path_buf(),
        })
    };

    Ok(IssueKey {
        year: number(2)?,
        month: number(3)?,
        day: number(4)?,
        issn: caps[1].to_ascii_uppercase(),
    })
}
