use super::{open_package, push_reference, read_part, write_package, xml_text};
use crate::services::error::{ConvertError, ConvertResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::path::Path;

const DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(String),
    PageBreak,
}

/// Plain text of every body paragraph, in document order (blank ones included).
pub fn read_paragraphs(path: &Path) -> ConvertResult<Vec<String>> {
    let mut archive = open_package(path)?;
    let xml = read_part(&mut archive, DOCUMENT_PART)?
        .ok_or_else(|| ConvertError::invalid("File is not a Word document (missing word/document.xml)"))?;
    parse_paragraphs(&xml)
}

fn parse_paragraphs(xml: &str) -> ConvertResult<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => (),
            },
            Event::Empty(e) if e.local_name().as_ref() == b"p" => paragraphs.push(String::new()),
            Event::Empty(e) => {
                if let Some(text) = current.as_mut() {
                    match e.local_name().as_ref() {
                        b"tab" => text.push('\t'),
                        b"br" if is_layout_break(&e) => (),
                        b"br" | b"cr" => text.push(' '),
                        _ => (),
                    }
                }
            }
            Event::Text(e) if in_text => {
                if let Some(text) = current.as_mut() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) if in_text => {
                if let Some(text) = current.as_mut() {
                    push_reference(text, &e);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(text) = current.take() {
                        paragraphs.push(text);
                    }
                }
                _ => (),
            },
            Event::Eof => break,
            _ => (),
        }
    }

    Ok(paragraphs)
}

/// Page and column breaks carry no text, unlike line breaks.
fn is_layout_break(e: &BytesStart<'_>) -> bool {
    e.attributes().flatten().any(|a| {
        a.key.local_name().as_ref() == b"type" && matches!(a.value.as_ref(), b"page" | b"column")
    })
}

/// Writes a minimal WordprocessingML package.
pub fn write(path: &Path, blocks: &[Block]) -> ConvertResult<()> {
    let mut body = String::new();
    for block in blocks {
        match block {
            Block::Paragraph(text) => {
                body.push_str("<w:p><w:r><w:t xml:space=\"preserve\">");
                body.push_str(&xml_text(text));
                body.push_str("</w:t></w:r></w:p>");
            }
            Block::PageBreak => body.push_str("<w:p><w:r><w:br w:type=\"page\"/></w:r></w:p>"),
        }
    }

    let document = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
            r#"<w:body>{}<w:sectPr><w:pgSz w:w="12240" w:h="15840"/></w:sectPr></w:body></w:document>"#
        ),
        body
    );

    write_package(
        path,
        &[
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("_rels/.rels", ROOT_RELS.to_string()),
            (DOCUMENT_PART, document),
        ],
    )
}

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"</Types>"#
);

const ROOT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#
);
