//! Source code and notebook rendering to PDF.

use crate::services::error::{ConvertError, ConvertResult};
use crate::services::pdf::canvas::{Canvas, PageSize, TextFlow, truncate_chars};
use crate::services::pdf::fonts::Font;
use serde::Deserialize;
use std::path::Path;

const MARGIN: f32 = 50.0;
const HEADER_FONT_SIZE: f32 = 14.0;
const HEADER_GAP: f32 = 30.0;
const RULE_GAP: f32 = 20.0;
const CODE_FONT_SIZE: f32 = 9.0;
const CODE_LEADING: f32 = 12.0;
const CODE_MAX_CHARS: usize = 92;
/// Offset of the code column from the line number column.
const CODE_INDENT: f32 = 50.0;
const LINE_NUMBER_GRAY: f32 = 0.5;

const MARKDOWN_FONT_SIZE: f32 = 10.0;
const MARKDOWN_LEADING: f32 = 14.0;
const MARKDOWN_MAX_CHARS: usize = 95;
const CELL_GAP: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLanguage {
    Java,
    Python,
    Cpp,
    Xml,
}

impl SourceLanguage {
    pub fn title(self) -> &'static str {
        match self {
            SourceLanguage::Java => "Java",
            SourceLanguage::Python => "Python",
            SourceLanguage::Cpp => "C++",
            SourceLanguage::Xml => "XML",
        }
    }
}

/// Decodes an uploaded text file; anything but UTF-8 is a client error.
pub fn read_source(path: &Path, language: &str) -> ConvertResult<String> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8(bytes).map_err(|_| {
        ConvertError::invalid(format!(
            "Unable to read {} file. Please ensure it's a valid text file with UTF-8 encoding.",
            language
        ))
    })?;
    Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
}

fn draw_header(canvas: &mut Canvas, flow: &mut TextFlow, title: &str) {
    flow.ensure_room(canvas);
    let page = canvas.page_size();
    canvas.draw_text(Font::HelveticaBold, HEADER_FONT_SIZE, MARGIN, flow.cursor(), title);
    flow.advance(HEADER_GAP);
    canvas.line(MARGIN, flow.cursor(), page.width - MARGIN, flow.cursor());
    flow.advance(RULE_GAP);
}

/// Draws numbered code lines, breaking pages as needed.
fn draw_code_lines<'a>(
    canvas: &mut Canvas,
    flow: &mut TextFlow,
    lines: impl Iterator<Item = &'a str>,
    gray: bool,
) {
    for (index, line) in lines.enumerate() {
        flow.ensure_room(canvas);
        let y = flow.cursor();
        canvas.set_fill_gray(LINE_NUMBER_GRAY);
        canvas.draw_text(Font::Courier, CODE_FONT_SIZE, MARGIN, y, &format!("{:>4} | ", index + 1));
        canvas.set_fill_gray(if gray { LINE_NUMBER_GRAY } else { 0.0 });
        canvas.draw_text(Font::Courier, CODE_FONT_SIZE, MARGIN + CODE_INDENT, y, &display_line(line));
        flow.advance(CODE_LEADING);
    }
}

fn display_line(line: &str) -> String {
    let line = line.trim_end_matches('\r');
    if line.chars().count() > CODE_MAX_CHARS {
        format!("{}...", truncate_chars(line, CODE_MAX_CHARS))
    } else {
        line.to_string()
    }
}

fn code_flow() -> TextFlow {
    let mut flow = TextFlow::new(Font::Courier, CODE_FONT_SIZE, MARGIN, CODE_LEADING);
    flow.bottom = MARGIN + 20.0;
    flow
}

/// Lays out a source file: a bold header, a rule, then numbered Courier lines.
pub fn render_source(source: &str, file_name: &str, language: SourceLanguage, output: &Path) -> ConvertResult<usize> {
    let mut canvas = Canvas::new();
    canvas.begin_page(PageSize::LETTER);
    let mut flow = code_flow();

    draw_header(
        &mut canvas,
        &mut flow,
        &format!("{} Source: {}", language.title(), file_name),
    );
    draw_code_lines(&mut canvas, &mut flow, source.split('\n'), false);

    let pages = canvas.page_count();
    canvas.save(output)?;
    Ok(pages)
}

#[derive(Debug, Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<NotebookCell>,
}

#[derive(Debug, Deserialize)]
struct NotebookCell {
    cell_type: String,
    #[serde(default)]
    source: MultilineText,
    #[serde(default)]
    execution_count: Option<u64>,
    #[serde(default)]
    outputs: Vec<NotebookOutput>,
}

#[derive(Debug, Deserialize)]
struct NotebookOutput {
    #[serde(default)]
    text: Option<MultilineText>,
    #[serde(default)]
    data: Option<OutputData>,
    #[serde(default)]
    ename: Option<String>,
    #[serde(default)]
    evalue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputData {
    #[serde(rename = "text/plain", default)]
    plain: Option<MultilineText>,
}

/// Notebook text fields are either one string or a list of line strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MultilineText {
    Joined(String),
    Lines(Vec<String>),
}

impl Default for MultilineText {
    fn default() -> Self {
        MultilineText::Joined(String::new())
    }
}

impl MultilineText {
    fn text(&self) -> String {
        match self {
            MultilineText::Joined(s) => s.clone(),
            MultilineText::Lines(lines) => lines.concat(),
        }
    }
}

impl NotebookOutput {
    fn text(&self) -> Option<String> {
        if let Some(text) = &self.text {
            return Some(text.text());
        }
        if let Some(plain) = self.data.as_ref().and_then(|d| d.plain.as_ref()) {
            return Some(plain.text());
        }
        self.ename
            .as_ref()
            .map(|name| format!("{}: {}", name, self.evalue.as_deref().unwrap_or("")))
    }
}

/// Lays out a Jupyter notebook: markdown cells in Helvetica, code cells with their
/// `In [n]:` prompt in Courier, and text outputs in gray.
pub fn render_notebook(json: &str, file_name: &str, output: &Path) -> ConvertResult<usize> {
    let notebook: Notebook = serde_json::from_str(json)
        .map_err(|e| ConvertError::invalid(format!("Invalid notebook file: {}", e)))?;

    let mut canvas = Canvas::new();
    canvas.begin_page(PageSize::LETTER);
    let mut flow = code_flow();
    draw_header(&mut canvas, &mut flow, &format!("Notebook: {}", file_name));

    for cell in &notebook.cells {
        let source = cell.source.text();
        match cell.cell_type.as_str() {
            "code" => {
                let prompt = match cell.execution_count {
                    Some(n) => format!("In [{}]:", n),
                    None => "In [ ]:".to_string(),
                };
                flow.ensure_room(&mut canvas);
                canvas.set_fill_rgb(0.1, 0.2, 0.6);
                canvas.draw_text(Font::HelveticaBold, CODE_FONT_SIZE, MARGIN, flow.cursor(), &prompt);
                flow.advance(CODE_LEADING);
                draw_code_lines(&mut canvas, &mut flow, source.lines(), false);

                for text in cell.outputs.iter().filter_map(NotebookOutput::text) {
                    draw_code_lines(&mut canvas, &mut flow, text.lines(), true);
                }
            }
            _ => {
                canvas.set_fill_gray(0.0);
                for line in source.lines() {
                    let line = line.trim_start_matches('#').trim();
                    if line.is_empty() {
                        flow.advance(MARKDOWN_LEADING / 2.0);
                        continue;
                    }
                    flow.ensure_room(&mut canvas);
                    canvas.draw_text(
                        Font::Helvetica,
                        MARKDOWN_FONT_SIZE,
                        MARGIN,
                        flow.cursor(),
                        truncate_chars(line, MARKDOWN_MAX_CHARS),
                    );
                    flow.advance(MARKDOWN_LEADING);
                }
            }
        }
        flow.advance(CELL_GAP);
    }

    let pages = canvas.page_count();
    canvas.save(output)?;
    Ok(pages)
}
