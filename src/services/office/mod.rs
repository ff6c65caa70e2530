//! Office Open XML (DOCX / XLSX) reading and writing, and the conversions between
//! office documents and PDF.

pub mod docx;
pub mod xlsx;

use crate::services::error::{ConvertError, ConvertResult};
use crate::services::pdf::canvas::{Canvas, TextFlow, truncate_chars};
use crate::services::pdf::fonts::Font;
use crate::services::pdf::{open_pdf, text};
use quick_xml::events::BytesRef;
use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const DOCX_MEDIA_TYPE: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const XLSX_MEDIA_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Name of the single sheet written by [`pdf_to_excel`].
pub const PDF_CONTENT_SHEET: &str = "PDF Content";

const LINE_MARGIN: f32 = 50.0;
const LINE_LEADING: f32 = 20.0;
const LINE_FONT_SIZE: f32 = 12.0;
const LINE_MAX_CHARS: usize = 100;

pub(crate) fn open_package(path: &Path) -> ConvertResult<ZipArchive<File>> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|e| match e {
        ZipError::InvalidArchive(_) | ZipError::UnsupportedArchive(_) => {
            ConvertError::invalid("File is not a valid Office document")
        }
        other => other.into(),
    })
}

/// Reads a package part as text; `None` when the part does not exist.
pub(crate) fn read_part(archive: &mut ZipArchive<File>, name: &str) -> ConvertResult<Option<String>> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

/// Writes a package with the given parts, in order.
pub(crate) fn write_package(path: &Path, parts: &[(&str, String)]) -> ConvertResult<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in parts {
        zip.start_file(*name, options)?;
        zip.write_all(content.as_bytes())?;
    }
    zip.finish()?;
    Ok(())
}

/// Appends the character an entity or character reference stands for.
pub(crate) fn push_reference(out: &mut String, reference: &BytesRef<'_>) {
    let name = String::from_utf8_lossy(reference.as_ref());
    let resolved = match name.as_ref() {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        other => other.strip_prefix('#').and_then(|code| {
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => code.parse().ok(),
            };
            value.and_then(char::from_u32)
        }),
    };
    if let Some(c) = resolved {
        out.push(c);
    }
}

/// Escapes text for element content, dropping characters XML 1.0 cannot carry.
pub(crate) fn xml_text(text: &str) -> Cow<'_, str> {
    let valid = |c: char| matches!(c, '\t' | '\n' | '\r') || c >= ' ';
    if text.chars().all(valid) {
        quick_xml::escape::escape(text)
    } else {
        let cleaned: String = text.chars().filter(|&c| valid(c)).collect();
        Cow::Owned(quick_xml::escape::escape(cleaned.as_str()).into_owned())
    }
}

/// Lays out lines top to bottom on US-Letter pages, skipping blank ones.
fn lines_to_pdf<I>(lines: I, output: &Path) -> ConvertResult<usize>
where
    I: IntoIterator<Item = String>,
{
    let mut canvas = Canvas::new();
    let mut flow = TextFlow::new(Font::Helvetica, LINE_FONT_SIZE, LINE_MARGIN, LINE_LEADING);
    let mut written = 0;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        flow.write_line(&mut canvas, truncate_chars(&line, LINE_MAX_CHARS));
        written += 1;
    }
    canvas.save(output)?;
    Ok(written)
}

pub fn word_to_pdf(input: &Path, output: &Path) -> ConvertResult<()> {
    let paragraphs = docx::read_paragraphs(input)?;
    let written = lines_to_pdf(paragraphs, output)?;
    debug!("Laid out {} paragraphs", written);
    Ok(())
}

pub fn excel_to_pdf(input: &Path, output: &Path) -> ConvertResult<()> {
    let rows = xlsx::read_active_sheet(input)?;
    let written = lines_to_pdf(rows.into_iter().map(|row| row.join(" | ")), output)?;
    debug!("Laid out {} rows", written);
    Ok(())
}

pub fn pdf_to_word(input: &Path, output: &Path) -> ConvertResult<()> {
    let doc = open_pdf(input)?;
    let mut blocks = Vec::new();
    for (index, page_text) in text::page_texts(&doc).iter().enumerate() {
        if index > 0 {
            blocks.push(docx::Block::PageBreak);
        }
        blocks.extend(text::lines(page_text).map(|line| docx::Block::Paragraph(line.to_string())));
    }
    docx::write(output, &blocks)
}

pub fn pdf_to_excel(input: &Path, output: &Path) -> ConvertResult<()> {
    let doc = open_pdf(input)?;
    let mut rows: Vec<Option<String>> = Vec::new();
    for (index, page_text) in text::page_texts(&doc).iter().enumerate() {
        rows.push(Some(format!("Page {}", index + 1)));
        rows.extend(text::lines(page_text).map(|line| Some(line.to_string())));
        rows.push(None);
    }
    xlsx::write_single_column(output, PDF_CONTENT_SHEET, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pdf::test_support::numbered_document;
    use crate::services::pdf::{page_count, page_ids};

    #[test]
    fn test_xml_text_escapes_and_strips() {
        assert_eq!(xml_text("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(xml_text("bell\u{7}ring"), "bellring");
        assert_eq!(xml_text("tab\tok"), "tab\tok");
    }

    #[test]
    fn test_word_round_trip_through_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("in.pdf");
        numbered_document(2).save(&pdf).unwrap();

        let docx_path = dir.path().join("out.docx");
        pdf_to_word(&pdf, &docx_path).unwrap();
        let paragraphs: Vec<String> = docx::read_paragraphs(&docx_path)
            .unwrap()
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        assert_eq!(paragraphs, vec!["Page 1".to_string(), "Page 2".to_string()]);

        let back = dir.path().join("back.pdf");
        word_to_pdf(&docx_path, &back).unwrap();
        let doc = open_pdf(&back).unwrap();
        assert_eq!(page_count(&doc), 1);
        assert!(doc.extract_text(&[1]).unwrap().contains("Page 2"));
    }

    #[test]
    fn test_pdf_to_excel_layout() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("in.pdf");
        numbered_document(2).save(&pdf).unwrap();

        let xlsx_path = dir.path().join("out.xlsx");
        pdf_to_excel(&pdf, &xlsx_path).unwrap();

        let rows = xlsx::read_active_sheet(&xlsx_path).unwrap();
        let first_cells: Vec<&str> = rows.iter().map(|r| r.first().map(String::as_str).unwrap_or("")).collect();
        assert_eq!(first_cells, vec!["Page 1", "Page 1", "", "Page 2", "Page 2", ""]);
        assert_eq!(xlsx::sheet_names(&xlsx_path).unwrap(), vec![PDF_CONTENT_SHEET.to_string()]);
    }

    #[test]
    fn test_long_documents_break_pages() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("lines.pdf");
        let lines = (0..80).map(|i| format!("Line number {}", i));
        assert_eq!(lines_to_pdf(lines, &output).unwrap(), 80);
        let doc = open_pdf(&output).unwrap();
        assert_eq!(page_ids(&doc).len(), 3);
    }

    #[test]
    fn test_not_a_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.docx");
        std::fs::write(&path, b"plain text, not a zip").unwrap();
        assert!(word_to_pdf(&path, &dir.path().join("out.pdf")).unwrap_err().is_client_error());
    }
}
