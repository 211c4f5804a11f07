use std::path::PathBuf;

use thiserror::Error;

/// Failure to read one ALTO document. The caller skips the file and moves on.
#[derive(Debug, Error)]
pub enum AltoError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },
}

#[derive(Debug, Error)]
#[error("path {path:?} does not carry an <ISSN>_<YYYY>-<MM>-<DD> issue name")]
pub struct MetadataError {
    pub path: PathBuf,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid token pattern: {0}")]
    TokenPattern(#[from] regex::Error),
    #[error("idf has {idf} columns but coef has {coef}")]
    DimensionMismatch { idf: usize, coef: usize },
    #[error("vocabulary term {term:?} maps to column {column}, out of range for {columns} columns")]
    ColumnOutOfRange {
        term: String,
        column: usize,
        columns: usize,
    },
    #[error("ngram_range ({0}, {1}) is invalid")]
    NgramRange(usize, usize),
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("ISSN {0} is not in the issue reference table")]
    UnknownIssn(String),
}

/// Any reason a single page file contributes nothing to its issue.
#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Alto(#[from] AltoError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}
