use super::{open_package, push_reference, read_part, write_package, xml_text};
use crate::services::error::{ConvertError, ConvertResult};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs::File;
use std::path::Path;
use zip::ZipArchive;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const DEFAULT_SHEET_PART: &str = "xl/worksheets/sheet1.xml";

/// Worksheet limits of the file format (column `XFD`, row 1048576).
const MAX_COLUMNS: usize = 16_384;
const MAX_ROWS: usize = 1_048_576;
/// Cells kept in memory for one sheet, padding included.
const MAX_SHEET_CELLS: usize = 2_000_000;

#[derive(Debug, Default)]
struct Workbook {
    /// (name, relationship id) in tab order.
    sheets: Vec<(String, String)>,
    active_tab: usize,
}

/// Cell text of the workbook's active sheet, row by row.
///
/// Rows and cells missing from the file are returned as empty strings so that row
/// and column positions are kept.
pub fn read_active_sheet(path: &Path) -> ConvertResult<Vec<Vec<String>>> {
    let mut archive = open_package(path)?;
    let workbook = match read_part(&mut archive, WORKBOOK_PART)? {
        Some(xml) => parse_workbook(&xml)?,
        None => {
            return Err(ConvertError::invalid(
                "File is not an Excel workbook (missing xl/workbook.xml)",
            ));
        }
    };

    let sheet_part = active_sheet_part(&mut archive, &workbook)?;
    let shared = match read_part(&mut archive, SHARED_STRINGS_PART)? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };
    let sheet = read_part(&mut archive, &sheet_part)?
        .ok_or_else(|| ConvertError::invalid(format!("Workbook is missing sheet {}", sheet_part)))?;
    parse_sheet(&sheet, &shared)
}

pub fn sheet_names(path: &Path) -> ConvertResult<Vec<String>> {
    let mut archive = open_package(path)?;
    let xml = read_part(&mut archive, WORKBOOK_PART)?.unwrap_or_default();
    Ok(parse_workbook(&xml)?.sheets.into_iter().map(|(name, _)| name).collect())
}

fn active_sheet_part(archive: &mut ZipArchive<File>, workbook: &Workbook) -> ConvertResult<String> {
    let Some((_, rel_id)) = workbook
        .sheets
        .get(workbook.active_tab)
        .or_else(|| workbook.sheets.first())
    else {
        return Ok(DEFAULT_SHEET_PART.to_string());
    };

    let Some(rels) = read_part(archive, WORKBOOK_RELS_PART)? else {
        return Ok(DEFAULT_SHEET_PART.to_string());
    };

    let mut reader = Reader::from_str(&rels);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let id = attribute(&e, b"Id")?;
                if id.as_deref() == Some(rel_id.as_str()) {
                    if let Some(target) = attribute(&e, b"Target")? {
                        return Ok(resolve_target(&target));
                    }
                }
            }
            Event::Eof => break,
            _ => (),
        }
    }
    Ok(DEFAULT_SHEET_PART.to_string())
}

/// Relationship targets are relative to `xl/` unless absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> ConvertResult<Option<String>> {
    Ok(e.try_get_attribute(key)?.map(|a| attribute_value(&a)))
}

fn attribute_value(attr: &Attribute<'_>) -> String {
    let raw = String::from_utf8_lossy(&attr.value);
    quick_xml::escape::unescape(&raw)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn parse_workbook(xml: &str) -> ConvertResult<Workbook> {
    let mut reader = Reader::from_str(xml);
    let mut workbook = Workbook::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let mut name = String::new();
                    let mut rel_id = String::new();
                    for attr in e.attributes() {
                        let attr = attr?;
                        let key = attr.key.as_ref();
                        if key == b"name" {
                            name = attribute_value(&attr);
                        } else if key.ends_with(b":id") {
                            rel_id = attribute_value(&attr);
                        }
                    }
                    workbook.sheets.push((name, rel_id));
                }
                b"workbookView" => {
                    if let Some(tab) = attribute(&e, b"activeTab")? {
                        workbook.active_tab = tab.parse().unwrap_or(0);
                    }
                }
                _ => (),
            },
            Event::Eof => break,
            _ => (),
        }
    }

    Ok(workbook)
}

fn parse_shared_strings(xml: &str) -> ConvertResult<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // Phonetic runs (<rPh>) are reading hints, not cell text.
    let mut in_phonetic = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"rPh" => in_phonetic = true,
                b"t" => in_text = !in_phonetic,
                _ => (),
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(e) if in_text => current.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::GeneralRef(e) if in_text => push_reference(&mut current, &e),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => (),
            },
            Event::Eof => break,
            _ => (),
        }
    }

    Ok(strings)
}

/// Zero-based column index of a cell reference such as `"AB12"`.
fn column_index(reference: &str) -> ConvertResult<Option<usize>> {
    let letters = reference.bytes().take_while(|b| b.is_ascii_alphabetic());
    let mut number = 0usize;
    for b in letters {
        number = number * 26 + (b.to_ascii_uppercase() - b'A' + 1) as usize;
        if number > MAX_COLUMNS {
            return Err(ConvertError::invalid(format!(
                "Cell reference '{}' is beyond the last column",
                reference
            )));
        }
    }
    Ok(number.checked_sub(1))
}

fn row_number(reference: &str) -> ConvertResult<Option<usize>> {
    let number = reference
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .parse::<usize>()
        .ok();
    match number {
        Some(n) if n > MAX_ROWS => Err(ConvertError::invalid(format!(
            "Row reference '{}' is beyond the last row",
            reference
        ))),
        other => Ok(other),
    }
}

/// Fails once a sheet would hold more than [`MAX_SHEET_CELLS`] cells.
fn reserve_cells(used: &mut usize, more: usize) -> ConvertResult<()> {
    *used = used.saturating_add(more);
    if *used > MAX_SHEET_CELLS {
        return Err(ConvertError::invalid(format!(
            "Worksheet has more than {} cells",
            MAX_SHEET_CELLS
        )));
    }
    Ok(())
}

struct PendingCell {
    column: usize,
    kind: Option<String>,
    value: String,
}

fn parse_sheet(xml: &str, shared: &[String]) -> ConvertResult<Vec<Vec<String>>> {
    let mut reader = Reader::from_str(xml);
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Option<Vec<String>> = None;
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;
    let mut used = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    pad_missing_rows(&mut rows, &e, &mut used)?;
                    row = Some(Vec::new());
                }
                b"c" => {
                    let column = match attribute(&e, b"r")? {
                        Some(reference) => column_index(&reference)?,
                        None => None,
                    }
                    .unwrap_or_else(|| row.as_ref().map_or(0, Vec::len));
                    cell = Some(PendingCell {
                        column,
                        kind: attribute(&e, b"t")?,
                        value: String::new(),
                    });
                }
                b"v" | b"t" => in_value = cell.is_some(),
                _ => (),
            },
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                pad_missing_rows(&mut rows, &e, &mut used)?;
                reserve_cells(&mut used, 1)?;
                rows.push(Vec::new());
            }
            Event::Text(e) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) if in_value => {
                if let Some(c) = cell.as_mut() {
                    push_reference(&mut c.value, &e);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let (Some(c), Some(cells)) = (cell.take(), row.as_mut()) {
                        let text = cell_text(c.kind.as_deref(), c.value, shared);
                        if cells.len() <= c.column {
                            reserve_cells(&mut used, c.column + 1 - cells.len())?;
                            cells.resize(c.column + 1, String::new());
                        }
                        cells[c.column] = text;
                    }
                }
                b"row" => {
                    if let Some(cells) = row.take() {
                        reserve_cells(&mut used, 1)?;
                        rows.push(cells);
                    }
                }
                _ => (),
            },
            Event::Eof => break,
            _ => (),
        }
    }

    Ok(rows)
}

/// Inserts empty rows for row numbers skipped before `row`.
/// Empty rows count one cell each against the sheet budget.
fn pad_missing_rows(rows: &mut Vec<Vec<String>>, row: &BytesStart<'_>, used: &mut usize) -> ConvertResult<()> {
    let number = match attribute(row, b"r")? {
        Some(reference) => row_number(&reference)?,
        None => None,
    };
    if let Some(number) = number {
        if rows.len() + 1 < number {
            reserve_cells(used, number - 1 - rows.len())?;
            rows.resize_with(number - 1, Vec::new);
        }
    }
    Ok(())
}

fn cell_text(kind: Option<&str>, raw: String, shared: &[String]) -> String {
    match kind {
        Some("s") => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i).cloned())
            .unwrap_or_default(),
        Some("b") => match raw.trim() {
            "1" => "TRUE".to_string(),
            _ => "FALSE".to_string(),
        },
        _ => raw,
    }
}

/// Writes a one-sheet workbook with a single column; `None` rows stay empty.
pub fn write_single_column(path: &Path, sheet_name: &str, rows: &[Option<String>]) -> ConvertResult<()> {
    let mut sheet_data = String::new();
    for (index, row) in rows.iter().enumerate() {
        let number = index + 1;
        match row {
            Some(text) => sheet_data.push_str(&format!(
                r#"<row r="{n}"><c r="A{n}" t="inlineStr"><is><t xml:space="preserve">{text}</t></is></c></row>"#,
                n = number,
                text = xml_text(text)
            )),
            None => sheet_data.push_str(&format!(r#"<row r="{}"/>"#, number)),
        }
    }

    let sheet = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
            r#"<sheetData>{}</sheetData></worksheet>"#
        ),
        sheet_data
    );

    let workbook = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" "#,
            r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
            r#"<bookViews><workbookView activeTab="0"/></bookViews>"#,
            r#"<sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
        ),
        quick_xml::escape::escape(sheet_name)
    );

    write_package(
        path,
        &[
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("_rels/.rels", ROOT_RELS.to_string()),
            (WORKBOOK_PART, workbook),
            (WORKBOOK_RELS_PART, WORKBOOK_RELS.to_string()),
            (DEFAULT_SHEET_PART, sheet),
        ],
    )
}

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
    r#"</Types>"#
);

const ROOT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
    r#"</Relationships>"#
);

const WORKBOOK_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#,
    r#"</Relationships>"#
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::office::write_package;

    #[test]
    fn test_column_and_row_references() {
        assert_eq!(column_index("A1").unwrap(), Some(0));
        assert_eq!(column_index("Z9").unwrap(), Some(25));
        assert_eq!(column_index("AA10").unwrap(), Some(26));
        assert_eq!(column_index("ab3").unwrap(), Some(27));
        assert_eq!(column_index("XFD1").unwrap(), Some(MAX_COLUMNS - 1));
        assert_eq!(column_index("12").unwrap(), None);
        assert_eq!(row_number("AB12").unwrap(), Some(12));
        assert_eq!(row_number("A1048576").unwrap(), Some(MAX_ROWS));
    }

    #[test]
    fn test_references_beyond_sheet_limits_are_rejected() {
        assert!(column_index("XFE1").unwrap_err().is_client_error());
        assert!(column_index("ZZZZZZZZZZZZZZZ1").unwrap_err().is_client_error());
        assert!(row_number("A1048577").unwrap_err().is_client_error());

        let far_row = r#"<worksheet><sheetData><row r="20000000"><c r="A20000000"><v>1</v></c></row></sheetData></worksheet>"#;
        assert!(parse_sheet(far_row, &[]).unwrap_err().is_client_error());

        let far_column = r#"<worksheet><sheetData><row r="1"><c r="ZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#;
        assert!(parse_sheet(far_column, &[]).unwrap_err().is_client_error());
    }

    #[test]
    fn test_sheet_cell_budget() {
        // Every row is valid on its own, together they exceed the budget.
        let rows: String = (1..=200)
            .map(|n| format!(r#"<row r="{n}"><c r="XFD{n}"><v>1</v></c></row>"#))
            .collect();
        let sheet = format!("<worksheet><sheetData>{}</sheetData></worksheet>", rows);
        assert!(parse_sheet(&sheet, &[]).unwrap_err().is_client_error());

        let sparse = r#"<worksheet><sheetData><row r="5"><c r="B5"><v>x</v></c></row></sheetData></worksheet>"#;
        let parsed = parse_sheet(sparse, &[]).unwrap();
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[4], vec![String::new(), "x".to_string()]);
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
        assert_eq!(resolve_target("/xl/worksheets/sheet3.xml"), "xl/worksheets/sheet3.xml");
    }

    #[test]
    fn test_parse_sheet_with_shared_and_inline_strings() {
        let shared = parse_shared_strings(
            r#"<sst><si><t>Name</t></si><si><r><t>Fish </t></r><r><t>&amp; chips</t></r></si><si><t>漢字</t><rPh><t>かんじ</t></rPh></si></sst>"#,
        )
        .unwrap();
        assert_eq!(shared, vec!["Name", "Fish & chips", "漢字"]);

        let sheet = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="s"><v>1</v></c></row>
            <row r="3"><c r="A3"><v>42.5</v></c><c r="B3" t="b"><v>1</v></c><c r="C3" t="inlineStr"><is><t>inline</t></is></c></row>
            <row r="4"><c r="B4" t="s"><v>2</v></c></row>
        </sheetData></worksheet>"#;
        let rows = parse_sheet(sheet, &shared).unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["Name".to_string(), String::new(), "Fish & chips".to_string()],
                Vec::new(),
                vec!["42.5".to_string(), "TRUE".to_string(), "inline".to_string()],
                vec![String::new(), "漢字".to_string()],
            ]
        );
    }

    #[test]
    fn test_active_tab_selects_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        let workbook = r#"<workbook xmlns:r="urn:r"><bookViews><workbookView activeTab="1"/></bookViews>
            <sheets><sheet name="First" sheetId="1" r:id="rId1"/><sheet name="Second &amp; last" sheetId="2" r:id="rId2"/></sheets></workbook>"#;
        let rels = r#"<Relationships>
            <Relationship Id="rId1" Target="worksheets/sheet1.xml"/>
            <Relationship Id="rId2" Target="/xl/worksheets/other.xml"/></Relationships>"#;
        write_package(
            &path,
            &[
                (WORKBOOK_PART, workbook.to_string()),
                (WORKBOOK_RELS_PART, rels.to_string()),
                ("xl/worksheets/sheet1.xml", r#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>one</t></is></c></row></sheetData></worksheet>"#.to_string()),
                ("xl/worksheets/other.xml", r#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>two</t></is></c></row></sheetData></worksheet>"#.to_string()),
            ],
        )
        .unwrap();

        assert_eq!(sheet_names(&path).unwrap(), vec!["First", "Second & last"]);
        assert_eq!(read_active_sheet(&path).unwrap(), vec![vec!["two".to_string()]]);
    }

    #[test]
    fn test_write_single_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        write_single_column(
            &path,
            "PDF Content",
            &[Some("Page 1".to_string()), Some("a < b".to_string()), None],
        )
        .unwrap();

        let rows = read_active_sheet(&path).unwrap();
        assert_eq!(rows, vec![vec!["Page 1".to_string()], vec!["a < b".to_string()], Vec::new()]);
    }
}
