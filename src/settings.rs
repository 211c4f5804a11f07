use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "classifier.toml";
const ENV_PREFIX: &str = "POEMS";

/// What to do when a poem's ISSN has no row in the reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownIssn {
    /// Abort the run.
    Fail,
    /// Write the poem under `placeholder_name`.
    Placeholder,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model_path: PathBuf,
    pub issues_path: PathBuf,
    pub issn_column: String,
    pub name_column: String,
    pub output_dir: PathBuf,
    pub ledger_file: String,
    pub log_file: PathBuf,
    pub log_filter: String,
    pub path_marker: String,
    pub min_block_chars: usize,
    pub unknown_issn: UnknownIssn,
    pub placeholder_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            model_path: PathBuf::from("svm.json"),
            issues_path: PathBuf::from("data/issue_numbers.csv"),
            issn_column: "ISSN".to_string(),
            name_column: "Paper title".to_string(),
            output_dir: PathBuf::from("foundpoems"),
            ledger_file: "found_poems.csv".to_string(),
            log_file: PathBuf::from("classifier.log"),
            log_filter: "debug".to_string(),
            path_marker: "alto".to_string(),
            min_block_chars: 94,
            unknown_issn: UnknownIssn::Fail,
            placeholder_name: "UNKNOWN".to_string(),
        }
    }
}

impl Settings {
    /// Defaults, then the optional TOML file, then `POEMS_*` environment variables.
    pub fn load(file: &Path) -> Result<Settings> {
        Config::builder()
            .add_source(File::from(file.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read settings from {}", file.display()))?
            .try_deserialize()
            .context("failed to deserialize settings")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.output_dir.join(&self.ledger_file)
    }
}
