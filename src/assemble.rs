use crate::parser::metadata::IssueKey;
use crate::parser::TextBlock;

/// One or more adjacent poem blocks printed in the same issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poem {
    pub text: String,
    pub key: IssueKey,
    pub block_ids: Vec<String>,
}

impl Poem {
    fn start(block: TextBlock) -> Poem {
        Poem {
            text: block.text,
            key: block.key,
            block_ids: vec![block.block_id],
        }
    }

    fn extend(&mut self, block: TextBlock) {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(&block.text);
        self.block_ids.push(block.block_id);
    }
}

/// Merges consecutive blocks sharing an issue key. A block with a different
/// key closes the poem in progress; keys never merge across such a block.
#[derive(Debug, Default)]
pub struct PoemAssembler {
    current: Option<Poem>,
}

impl PoemAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next block in extraction order. Returns the poem it closed, if any.
    pub fn push(&mut self, block: TextBlock) -> Option<Poem> {
        if let Some(poem) = self.current.as_mut() {
            if poem.key == block.key {
                poem.extend(block);
                return None;
            }
        }
        self.current.replace(Poem::start(block))
    }

    /// Close the poem in progress.
    pub fn finish(self) -> Option<Poem> {
        self.current
    }
}
