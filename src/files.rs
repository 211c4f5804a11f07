use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use walkdir::{DirEntry, WalkDir};

// <issue dir>/<page>.xml, where the page name is a plain identifier
static PAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)/[a-zA-Z0-9_-]+\.xml$").unwrap());

/// Files of one issue, keyed by their shared directory prefix, in scan order.
pub type IssueGroups = BTreeMap<String, Vec<PathBuf>>;

/// Every `*.xml` file below `root`, sorted by path. Hidden entries are skipped.
pub fn find_xml_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "xml")
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Bucket page files into issues. Paths without `marker` or not shaped like
/// `<prefix>/<page>.xml` are dropped.
pub fn group_by_issue(files: &[PathBuf], marker: &str) -> IssueGroups {
    let mut groups = IssueGroups::new();
    for file in files {
        let path = file.to_string_lossy();
        if !path.contains(marker) {
            continue;
        }
        if let Some(caps) = PAGE_RE.captures(&path) {
            groups.entry(caps[1].to_string()).or_default().push(file.clone());
        }
    }
    groups
}
