pub mod alto;
pub mod metadata;

use std::path::Path;

use crate::error::PageError;
use metadata::IssueKey;

/// A classification unit: one ALTO text block with the issue it was printed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub text: String,
    pub block_id: String,
    pub key: IssueKey,
}

/// Two steps: path → issue key, document → blocks.
pub fn read_page(path: &Path) -> Result<Vec<TextBlock>, PageError> {
    let key = metadata::parse_from_path(path)?;
    let blocks = alto::read_blocks(path)?;
    Ok(blocks
        .into_iter()
        .map(|b| TextBlock {
            text: b.text,
            block_id: b.id,
            key: key.clone(),
        })
        .collect())
}
