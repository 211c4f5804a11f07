use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::settings::{Settings, UnknownIssn};
use crate::error::LookupError;

/// Read-only ISSN → newspaper name mapping, loaded once per run.
#[derive(Debug, Clone)]
pub struct IssueTable {
    names: HashMap<String, String>,
    unknown: UnknownIssn,
    placeholder: String,
}

impl IssueTable {
    pub fn load(settings: &Settings) -> Result<IssueTable> {
        let names = read_names(
            &settings.issues_path,
            &settings.issn_column,
            &settings.name_column,
        )?;
        Ok(IssueTable {
            names,
            unknown: settings.unknown_issn,
            placeholder: settings.placeholder_name.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Newspaper name for `issn`; unknown ISSNs follow the configured policy.
    pub fn paper_name(&self, issn: &str) -> Result<&str, LookupError> {
        match (self.names.get(issn), self.unknown) {
            (Some(name), _) => Ok(name.as_str()),
            (None, UnknownIssn::Placeholder) => Ok(self.placeholder.as_str()),
            (None, UnknownIssn::Fail) => Err(LookupError::UnknownIssn(issn.to_string())),
        }
    }
}

/// First row wins when an ISSN is listed more than once.
fn read_names(path: &Path, issn_column: &str, name_column: &str) -> Result<HashMap<String, String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open issue table {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let (Some(issn_idx), Some(name_idx)) = (column(issn_column), column(name_column)) else {
        bail!(
            "issue table {} needs columns {:?} and {:?}, found {:?}",
            path.display(),
            issn_column,
            name_column,
            headers
        );
    };

    let mut names = HashMap::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("bad row {} in {}", i + 1, path.display()))?;
        let (Some(issn), Some(name)) = (record.get(issn_idx), record.get(name_idx)) else {
            continue;
        };
        let issn = issn.trim().to_ascii_uppercase();
        if issn.is_empty() {
            continue;
        }
        names.entry(issn).or_insert_with(|| name.trim().to_string());
    }
    Ok(names)
}
