use std::ops::AddAssign;
use std::path::PathBuf;

use anyhow::{ensure, Context as _, Result};
use tracing::{debug, error};

use crate::assemble::{Poem, PoemAssembler};
use crate::classifier::Classifier;
use crate::issues::IssueTable;
use crate::output::PoemWriter;
use crate::parser::{self, TextBlock};

/// Everything a run shares across issues.
pub struct Context<'a> {
    pub classifier: &'a dyn Classifier,
    pub issues: &'a IssueTable,
    pub writer: &'a PoemWriter,
    pub min_block_chars: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IssueSummary {
    pub files_read: usize,
    pub files_skipped: usize,
    pub blocks: usize,
    pub poem_blocks: usize,
    pub poems: usize,
}

impl AddAssign for IssueSummary {
    fn add_assign(&mut self, other: Self) {
        self.files_read += other.files_read;
        self.files_skipped += other.files_skipped;
        self.blocks += other.blocks;
        self.poem_blocks += other.poem_blocks;
        self.poems += other.poems;
    }
}

/// Read, classify, assemble and write one issue. Unreadable pages are
/// skipped; output failures abort.
pub fn process_issue(ctx: &Context, files: &[PathBuf]) -> Result<IssueSummary> {
    let mut summary = IssueSummary::default();
    let mut blocks = Vec::new();

    for file in files {
        match parser::read_page(file) {
            Ok(page) => {
                debug!("Read file {}", file.display());
                summary.files_read += 1;
                blocks.extend(page);
            }
            Err(e) => {
                error!("Error in XML: {}: {}", file.display(), e);
                summary.files_skipped += 1;
            }
        }
    }
    summary.blocks = blocks.len();

    let poem_blocks = classify_and_filter(ctx.classifier, blocks, ctx.min_block_chars)?;
    summary.poem_blocks = poem_blocks.len();
    debug!(
        blocks = summary.blocks,
        poem_blocks = summary.poem_blocks,
        "Prediction done"
    );
    if poem_blocks.is_empty() {
        return Ok(summary);
    }

    let mut assembler = PoemAssembler::new();
    for block in poem_blocks {
        if let Some(poem) = assembler.push(block) {
            write_poem(ctx, &poem)?;
            summary.poems += 1;
        }
    }
    if let Some(poem) = assembler.finish() {
        write_poem(ctx, &poem)?;
        summary.poems += 1;
    }

    Ok(summary)
}

/// Keep blocks the classifier accepts that are at least `min_chars` long.
/// The classifier sees each text on a single line and is called once; it
/// must answer for every block.
pub fn classify_and_filter(
    classifier: &dyn Classifier,
    blocks: Vec<TextBlock>,
    min_chars: usize,
) -> Result<Vec<TextBlock>> {
    if blocks.is_empty() {
        return Ok(blocks);
    }
    let texts: Vec<String> = blocks.iter().map(|b| b.text.replace('\n', " ")).collect();
    let predicted = classifier.predict(&texts);
    ensure!(
        predicted.len() == blocks.len(),
        "classifier returned {} predictions for {} blocks",
        predicted.len(),
        blocks.len()
    );

    Ok(blocks
        .into_iter()
        .zip(predicted)
        .filter(|(b, is_poem)| *is_poem && b.text.chars().count() >= min_chars)
        .map(|(b, _)| b)
        .collect())
}

fn write_poem(ctx: &Context, poem: &Poem) -> Result<()> {
    let paper = ctx.issues.paper_name(&poem.key.issn)?;
    ctx.writer
        .write(poem, paper)
        .with_context(|| format!("failed to write poem {}", poem.key))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::Path;

    use super::*;
    use crate::settings::{Settings, UnknownIssn};
    use crate::output::create_ledger;
    use crate::parser::metadata::IssueKey;

    /// Accepts texts containing `word`; records every batch it is given.
    struct KeywordClassifier {
        word: &'static str,
        batches: RefCell<Vec<Vec<String>>>,
    }

    impl KeywordClassifier {
        fn new(word: &'static str) -> Self {
            KeywordClassifier {
                word,
                batches: RefCell::new(Vec::new()),
            }
        }
    }

    impl Classifier for KeywordClassifier {
        fn predict(&self, texts: &[String]) -> Vec<bool> {
            self.batches.borrow_mut().push(texts.to_vec());
            texts.iter().map(|t| t.contains(self.word)).collect()
        }
    }

    const POEM_LINE_1: &str = "Kun kevät tulee kukkimaan ja lintu laulaa oksalla runo";
    const POEM_LINE_2: &str = "niin sydän sykkii riemuiten ja mieli nousee korkealle";
    const NEWS_LINE: &str = "Hinta kolme markkaa vuosikerralta, tilaukset postikonttoreissa kautta maan";

    fn alto(blocks: &[(&str, Vec<&str>)]) -> String {
        let mut xml = String::from("<?xml version=\"1.0\"?>\n<alto><Layout><Page><PrintSpace>\n");
        for (id, lines) in blocks {
            xml.push_str(&format!("<TextBlock ID=\"{}\">\n", id));
            for line in lines {
                xml.push_str("<TextLine>");
                for word in line.split(' ') {
                    xml.push_str(&format!("<String CONTENT=\"{}\"/>", word));
                }
                xml.push_str("</TextLine>\n");
            }
            xml.push_str("</TextBlock>\n");
        }
        xml.push_str("</PrintSpace></Page></Layout></alto>\n");
        xml
    }

    fn write_page(dir: &Path, name: &str, xml: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, xml).unwrap();
        path
    }

    fn table(policy: UnknownIssn) -> IssueTable {
        IssueTable::load(&Settings {
            issues_path: "tests/fixtures/issue_numbers.csv".into(),
            unknown_issn: policy,
            ..Settings::default()
        })
        .unwrap()
    }

    fn ledger_rows(path: &Path) -> Vec<csv::StringRecord> {
        csv::Reader::from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap())
            .collect()
    }

    fn poem_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".txt"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn issue_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let issue = tmp.path().join("1457-4616_1854-01-07_1/alto");
        let pages = vec![
            write_page(
                &issue,
                "1457-4616_1854-01-07_1_001.xml",
                &alto(&[
                    ("P1_TB1", vec![NEWS_LINE]),
                    ("P1_TB2", vec![POEM_LINE_1, POEM_LINE_2]),
                    ("P1_TB3", vec!["lyhyt runo"]),
                ]),
            ),
            write_page(&issue, "1457-4616_1854-01-07_1_002.xml", "<alto><TextBlock></alto>"),
            write_page(
                &issue,
                "1457-4616_1854-01-07_1_003.xml",
                &alto(&[("P3_TB1", vec![POEM_LINE_2, POEM_LINE_1])]),
            ),
        ];

        let out = tmp.path().join("foundpoems");
        let ledger = out.join("found_poems.csv");
        create_ledger(&ledger).unwrap();
        let writer = PoemWriter::new(&out, &ledger).unwrap();
        let classifier = KeywordClassifier::new("runo");
        let issues = table(UnknownIssn::Fail);
        let ctx = Context {
            classifier: &classifier,
            issues: &issues,
            writer: &writer,
            min_block_chars: 94,
        };

        let summary = process_issue(&ctx, &pages).unwrap();
        assert_eq!(
            summary,
            IssueSummary {
                files_read: 2,
                files_skipped: 1,
                blocks: 4,
                poem_blocks: 2,
                poems: 1,
            }
        );

        // one call for the whole issue, newlines flattened
        let batches = classifier.batches.borrow();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 4);
        assert!(batches[0].iter().all(|t| !t.contains('\n')));

        let rows = ledger_rows(&ledger);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].iter().skip(1).collect::<Vec<_>>(),
            ["1854", "1", "7", "Oulun Wiikko-Sanomia", "1457-4616"]
        );
        assert!(!rows[0][0].contains('\n'));

        assert_eq!(
            poem_files(&out),
            ["1854_1_7_Oulun Wiikko-Sanomia P1_TB2 P3_TB1.txt"]
        );
        let text =
            std::fs::read_to_string(out.join("1854_1_7_Oulun Wiikko-Sanomia P1_TB2 P3_TB1.txt"))
                .unwrap();
        assert_eq!(
            text,
            format!("{POEM_LINE_1}\n{POEM_LINE_2}\n{POEM_LINE_2}\n{POEM_LINE_1}")
        );
    }

    #[test]
    fn nothing_survives_filter() {
        let tmp = tempfile::tempdir().unwrap();
        let issue = tmp.path().join("1457-4616_1854-01-07_1/alto");
        let pages = vec![write_page(
            &issue,
            "1457-4616_1854-01-07_1_001.xml",
            &alto(&[("P1_TB1", vec![NEWS_LINE]), ("P1_TB2", vec!["lyhyt runo"])]),
        )];

        let out = tmp.path().join("foundpoems");
        let ledger = out.join("found_poems.csv");
        create_ledger(&ledger).unwrap();
        let writer = PoemWriter::new(&out, &ledger).unwrap();
        let classifier = KeywordClassifier::new("runo");
        let issues = table(UnknownIssn::Fail);
        let ctx = Context {
            classifier: &classifier,
            issues: &issues,
            writer: &writer,
            min_block_chars: 94,
        };

        let summary = process_issue(&ctx, &pages).unwrap();
        assert_eq!(summary.poems, 0);
        assert!(ledger_rows(&ledger).is_empty());
        assert!(poem_files(&out).is_empty());
    }

    #[test]
    fn unknown_issn_aborts_under_fail_policy() {
        let tmp = tempfile::tempdir().unwrap();
        let issue = tmp.path().join("9999-9999_1901-02-03_1/alto");
        let pages = vec![write_page(
            &issue,
            "9999-9999_1901-02-03_1_001.xml",
            &alto(&[("P1_TB1", vec![POEM_LINE_1, POEM_LINE_2])]),
        )];

        let out = tmp.path().join("foundpoems");
        let ledger = out.join("found_poems.csv");
        let writer = PoemWriter::new(&out, &ledger).unwrap();
        let classifier = KeywordClassifier::new("runo");

        let strict = table(UnknownIssn::Fail);
        let ctx = Context {
            classifier: &classifier,
            issues: &strict,
            writer: &writer,
            min_block_chars: 94,
        };
        assert!(process_issue(&ctx, &pages).is_err());

        let lenient = table(UnknownIssn::Placeholder);
        let ctx = Context {
            issues: &lenient,
            ..ctx
        };
        assert_eq!(process_issue(&ctx, &pages).unwrap().poems, 1);
        assert_eq!(&ledger_rows_no_header(&ledger)[0][4], "UNKNOWN");
    }

    fn ledger_rows_no_header(path: &Path) -> Vec<csv::StringRecord> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn filter_keeps_order_and_threshold() {
        let key = IssueKey {
            year: 1880,
            month: 6,
            day: 1,
            issn: "1235-9475".into(),
        };
        let block = |id: &str, text: String| TextBlock {
            text,
            block_id: id.into(),
            key: key.clone(),
        };
        let blocks = vec![
            block("a", "ä".repeat(94)),
            block("b", "x".repeat(93)),
            block("c", "y".repeat(200)),
            block("d", "ö".repeat(100)),
        ];
        struct AllButC;
        impl Classifier for AllButC {
            fn predict(&self, texts: &[String]) -> Vec<bool> {
                texts.iter().map(|t| !t.starts_with('y')).collect()
            }
        }

        let kept = classify_and_filter(&AllButC, blocks, 94).unwrap();
        let ids: Vec<&str> = kept.iter().map(|b| b.block_id.as_str()).collect();
        assert_eq!(ids, ["a", "d"]);
    }

    #[test]
    fn short_prediction_batch_is_an_error() {
        struct DropsLast;
        impl Classifier for DropsLast {
            fn predict(&self, texts: &[String]) -> Vec<bool> {
                vec![true; texts.len().saturating_sub(1)]
            }
        }
        let key = IssueKey {
            year: 1880,
            month: 6,
            day: 1,
            issn: "1235-9475".into(),
        };
        let blocks: Vec<TextBlock> = ["a", "b"]
            .iter()
            .map(|id| TextBlock {
                text: "runo ".repeat(30),
                block_id: id.to_string(),
                key: key.clone(),
            })
            .collect();

        let err = classify_and_filter(&DropsLast, blocks, 94).unwrap_err();
        assert!(err.to_string().contains("1 predictions for 2 blocks"));
    }

    #[test]
    fn summaries_add_up() {
        let mut total = IssueSummary::default();
        total += IssueSummary {
            files_read: 2,
            files_skipped: 1,
            blocks: 10,
            poem_blocks: 3,
            poems: 2,
        };
        total += IssueSummary {
            files_read: 1,
            poems: 1,
            ..IssueSummary::default()
        };
        assert_eq!(total.files_read, 3);
        assert_eq!(total.poems, 3);
        assert_eq!(total.blocks, 10);
    }
}
