use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::AltoError;

/// Element selected as a classification unit.
pub const BLOCK_ELEMENT: &[u8] = b"TextBlock";
const LINE_ELEMENT: &[u8] = b"TextLine";
const WORD_ELEMENT: &[u8] = b"String";

/// One OCR text block: its lines joined with `\n`, plus the block's `ID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub id: String,
    pub text: String,
}

/// Read a page from disk. The bytes are decoded by the document's own
/// encoding declaration (or BOM), so Latin-1 pages read the same as UTF-8.
pub fn read_blocks(path: &Path) -> Result<Vec<RawBlock>, AltoError> {
    let file = File::open(path).map_err(|source| AltoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    collect_blocks(Reader::from_reader(BufReader::new(file)))
}

/// Collect every `TextBlock` in document order. Namespaces are ignored,
/// elements are matched on their local name.
pub fn parse_blocks(xml: &str) -> Result<Vec<RawBlock>, AltoError> {
    collect_blocks(Reader::from_str(xml))
}

fn collect_blocks<R: BufRead>(mut reader: Reader<R>) -> Result<Vec<RawBlock>, AltoError> {
    let mut buf = Vec::new();

    let mut blocks = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;
    let mut line: Option<Vec<String>> = None;
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| AltoError::Malformed {
            position: reader.error_position(),
            message: e.to_string(),
        })?;

        let decoder = reader.decoder();
        match event {
            Event::Start(e) => {
                depth += 1;
                seen_root = true;
                match e.local_name().as_ref() {
                    BLOCK_ELEMENT => current = Some((attribute(&e, b"ID", decoder)?, Vec::new())),
                    LINE_ELEMENT if current.is_some() => line = Some(Vec::new()),
                    WORD_ELEMENT => push_word(&e, &mut line, decoder)?,
                    _ => {}
                }
            }
            Event::Empty(e) => {
                seen_root = true;
                match e.local_name().as_ref() {
                    BLOCK_ELEMENT => blocks.push(RawBlock {
                        id: attribute(&e, b"ID", decoder)?,
                        text: String::new(),
                    }),
                    LINE_ELEMENT => {
                        if let Some((_, lines)) = current.as_mut() {
                            lines.push(String::new());
                        }
                    }
                    WORD_ELEMENT => push_word(&e, &mut line, decoder)?,
                    _ => {}
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                match e.local_name().as_ref() {
                    LINE_ELEMENT => {
                        if let (Some(words), Some((_, lines))) = (line.take(), current.as_mut()) {
                            lines.push(words.join(" "));
                        }
                    }
                    BLOCK_ELEMENT => {
                        if let Some((id, lines)) = current.take() {
                            blocks.push(RawBlock {
                                id,
                                text: lines.join("\n"),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth != 0 {
        return Err(AltoError::Malformed {
            position: reader.buffer_position(),
            message: format!("document ended with {} unclosed element(s)", depth),
        });
    }
    if !seen_root {
        return Err(AltoError::Malformed {
            position: 0,
            message: "no root element".to_string(),
        });
    }
    Ok(blocks)
}

fn push_word(
    e: &BytesStart,
    line: &mut Option<Vec<String>>,
    decoder: Decoder,
) -> Result<(), AltoError> {
    if let Some(words) = line.as_mut() {
        let content = attribute(e, b"CONTENT", decoder)?;
        if !content.is_empty() {
            words.push(content);
        }
    }
    Ok(())
}

/// Unescaped attribute value, or an empty string when absent.
fn attribute(e: &BytesStart, name: &[u8], decoder: Decoder) -> Result<String, AltoError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| AltoError::Malformed {
            position: 0,
            message: err.to_string(),
        })?;
        if attr.key.local_name().as_ref() == name {
            let value = attr
                .decode_and_unescape_value(decoder)
                .map_err(|err| AltoError::Malformed {
                    position: 0,
                    message: err.to_string(),
                })?;
            return Ok(value.into_owned());
        }
    }
    Ok(String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_fixture() {
        let xml = std::fs::read_to_string("tests/fixtures/page.xml").unwrap();
        let blocks = parse_blocks(&xml).unwrap();
        let ids: Vec<&str> = blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["P1_TB00001", "P1_TB00002", "P1_TB00003"]);
        assert_eq!(blocks[0].text, "SANOMIA");
        assert_eq!(
            blocks[1].text,
            "Kun kevät tulee kukkimaan\nja lintu laulaa oksalla"
        );
        assert_eq!(blocks[2].text, "");
    }

    #[test]
    fn entities_are_unescaped() {
        let xml = r#"<alto><Layout><TextBlock ID="b1"><TextLine><String CONTENT="Tom &amp; Jerry"/><String CONTENT="&quot;x&quot;"/></TextLine></TextBlock></Layout></alto>"#;
        let blocks = parse_blocks(xml).unwrap();
        assert_eq!(blocks[0].text, "Tom & Jerry \"x\"");
    }

    #[test]
    fn namespaced_elements() {
        let xml = r#"<a:alto xmlns:a="http://www.loc.gov/standards/alto/ns-v3#"><a:TextBlock ID="n1"><a:TextLine><a:String CONTENT="yksi"/></a:TextLine></a:TextBlock></a:alto>"#;
        let blocks = parse_blocks(xml).unwrap();
        assert_eq!(blocks, vec![RawBlock { id: "n1".into(), text: "yksi".into() }]);
    }

    #[test]
    fn block_without_id() {
        let xml = r#"<alto><TextBlock><TextLine><String CONTENT="a"/></TextLine></TextBlock></alto>"#;
        assert_eq!(parse_blocks(xml).unwrap()[0].id, "");
    }

    #[test]
    fn mismatched_tag_is_malformed() {
        let xml = std::fs::read_to_string("tests/fixtures/broken.xml").unwrap();
        assert!(matches!(parse_blocks(&xml), Err(AltoError::Malformed { .. })));
    }

    #[test]
    fn unclosed_document_is_malformed() {
        let xml = r#"<alto><TextBlock ID="b1"><TextLine>"#;
        assert!(matches!(parse_blocks(xml), Err(AltoError::Malformed { .. })));
    }

    #[test]
    fn empty_document_is_malformed() {
        assert!(parse_blocks("").is_err());
    }

    #[test]
    fn latin1_page_is_decoded() {
        let blocks = read_blocks(Path::new("tests/fixtures/latin1.xml")).unwrap();
        assert_eq!(
            blocks,
            vec![RawBlock {
                id: "P1_TB00001".into(),
                text: "Kun kevät tulee\nsydän sykkii".into(),
            }]
        );
    }

    #[test]
    fn utf8_page_from_disk() {
        let blocks = read_blocks(Path::new("tests/fixtures/page.xml")).unwrap();
        assert_eq!(blocks[1].text, "Kun kevät tulee kukkimaan\nja lintu laulaa oksalla");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_blocks(Path::new("tests/fixtures/does-not-exist.xml")).unwrap_err();
        assert!(matches!(err, AltoError::Io { .. }));
    }
}
