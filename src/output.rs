use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::assemble::Poem;

pub const LEDGER_HEADER: [&str; 6] = ["Poem", "Year", "Month", "Day", "Newspaper name", "ISSN"];

const MAX_NAME_CHARS: usize = 247;
const KEPT_NAME_CHARS: usize = 240;
const TRUNCATION_MARKER: &str = " TRUNCATED";
const EXTENSION: &str = ".txt";
/// NAME_MAX on common filesystems, counted in UTF-8 bytes.
const MAX_FILE_NAME_BYTES: usize = 255;

/// One ledger row. Field order follows [`LEDGER_HEADER`].
#[derive(Debug, Serialize)]
pub struct PoemRecord<'a> {
    pub poem: String,
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub newspaper: &'a str,
    pub issn: &'a str,
}

impl<'a> PoemRecord<'a> {
    pub fn new(poem: &'a Poem, newspaper: &'a str) -> Self {
        PoemRecord {
            poem: poem.text.replace('\n', " "),
            year: poem.key.year,
            month: poem.key.month,
            day: poem.key.day,
            newspaper,
            issn: &poem.key.issn,
        }
    }
}

/// (Re)create the ledger holding only the header row.
pub fn create_ledger(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(LEDGER_HEADER)?;
    writer.flush()?;
    info!("Created new CSV file {}", path.display());
    Ok(())
}

/// Appends ledger rows and writes one text file per poem.
#[derive(Debug, Clone)]
pub struct PoemWriter {
    output_dir: PathBuf,
    ledger: PathBuf,
}

impl PoemWriter {
    pub fn new(output_dir: &Path, ledger: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        Ok(PoemWriter {
            output_dir: output_dir.to_path_buf(),
            ledger: ledger.to_path_buf(),
        })
    }

    /// Write `poem` under `newspaper`, returning the poem file path.
    /// The text file goes first so a failed write leaves no ledger row behind.
    pub fn write(&self, poem: &Poem, newspaper: &str) -> Result<PathBuf> {
        let path = self.output_dir.join(poem_file_name(poem, newspaper));
        fs::write(&path, &poem.text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!("Written poem to file {}", path.display());

        self.append_row(&PoemRecord::new(poem, newspaper))?;
        Ok(path)
    }

    // Reopened per row so every row reaches disk before the next one starts.
    fn append_row(&self, record: &PoemRecord) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.ledger)
            .with_context(|| format!("failed to open {}", self.ledger.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        debug!("Updated CSV file");
        Ok(())
    }
}

/// `{year}_{month}_{day}_{paper} {block ids}.txt`. Names over 247 characters
/// are cut to 240 plus a truncation marker, and the whole file name never
/// exceeds 255 bytes.
pub fn poem_file_name(poem: &Poem, newspaper: &str) -> String {
    let paper = newspaper.replace(['/', '\\'], "_");
    let name = format!(
        "{}_{}_{}_{} {}",
        poem.key.year,
        poem.key.month,
        poem.key.day,
        paper,
        poem.block_ids.join(" ")
    );
    if name.chars().count() <= MAX_NAME_CHARS
        && name.len() + EXTENSION.len() <= MAX_FILE_NAME_BYTES
    {
        return format!("{}{}", name, EXTENSION);
    }

    let kept: String = name.chars().take(KEPT_NAME_CHARS).collect();
    let budget = MAX_FILE_NAME_BYTES - TRUNCATION_MARKER.len() - EXTENSION.len();
    format!("{}{}{}", prefix_within(&kept, budget), TRUNCATION_MARKER, EXTENSION)
}

/// Longest prefix of `s` of at most `max` bytes ending on a char boundary.
fn prefix_within(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let end = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max)
        .last()
        .unwrap_or(0);
    &s[..end]
}
