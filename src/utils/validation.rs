use crate::services::error::ConvertError;
use std::path::Path;

/// Longest display name kept from a client supplied filename.
const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ConvertError {
    fn from(e: ValidationError) -> Self {
        ConvertError::Invalid(e.message)
    }
}

/// Document kinds accepted as conversion input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Jpeg,
    Png,
    Image,
    Docx,
    Xlsx,
    Java,
    Python,
    Cpp,
    Xml,
    Notebook,
}

impl InputKind {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            InputKind::Pdf => &["pdf"],
            InputKind::Jpeg => &["jpg", "jpeg"],
            InputKind::Png => &["png"],
            InputKind::Image => &["jpg", "jpeg", "png", "gif", "webp"],
            InputKind::Docx => &["docx"],
            InputKind::Xlsx => &["xlsx", "xlsm"],
            InputKind::Java => &["java"],
            InputKind::Python => &["py"],
            InputKind::Cpp => &["cpp", "cc", "cxx", "c", "h", "hpp", "hh"],
            InputKind::Xml => &["xml"],
            InputKind::Notebook => &["ipynb"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InputKind::Pdf => "PDF",
            InputKind::Jpeg => "JPG",
            InputKind::Png => "PNG",
            InputKind::Image => "image",
            InputKind::Docx => "Word (.docx)",
            InputKind::Xlsx => "Excel (.xlsx)",
            InputKind::Java => "Java",
            InputKind::Python => "Python",
            InputKind::Cpp => "C++",
            InputKind::Xml => "XML",
            InputKind::Notebook => "Jupyter notebook",
        }
    }

    fn is_text(self) -> bool {
        matches!(
            self,
            InputKind::Java | InputKind::Python | InputKind::Cpp | InputKind::Xml | InputKind::Notebook
        )
    }

    /// Extensions detected by `infer` that are compatible with this kind.
    fn sniffed_extensions(self) -> &'static [&'static str] {
        match self {
            InputKind::Pdf => &["pdf"],
            InputKind::Jpeg => &["jpg"],
            InputKind::Png => &["png"],
            InputKind::Image => &["jpg", "png", "gif", "webp"],
            InputKind::Docx => &["zip", "docx"],
            InputKind::Xlsx => &["zip", "xlsx"],
            _ => &[],
        }
    }
}

/// Checks the claimed filename's extension against the expected input kind.
pub fn require_kind(file_name: &str, kind: InputKind) -> Result<(), ValidationError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if kind.extensions().contains(&ext.as_str()) {
        return Ok(());
    }

    Err(ValidationError::new(
        "INVALID_EXTENSION",
        format!(
            "File {} is not a {} file (expected .{})",
            file_name,
            kind.label(),
            kind.extensions().join(", .")
        ),
    ))
}

/// Checks the leading bytes of a staged file against the expected kind.
///
/// Text kinds only need to be free of NUL bytes; binary kinds must carry a
/// recognizable signature.
pub fn verify_signature(header: &[u8], file_name: &str, kind: InputKind) -> Result<(), ValidationError> {
    if header.is_empty() {
        return Err(ValidationError::new(
            "EMPTY_FILE",
            format!("File {} is empty", file_name),
        ));
    }

    if kind.is_text() {
        if header.iter().take(512).any(|&b| b == 0) {
            return Err(ValidationError::new(
                "BINARY_AS_TEXT",
                format!("File {} contains binary content", file_name),
            ));
        }
        return Ok(());
    }

    let detected = infer::get(header).map(|t| t.extension());
    match detected {
        Some(ext) if kind.sniffed_extensions().contains(&ext) => Ok(()),
        Some(ext) => Err(ValidationError::new(
            "SIGNATURE_MISMATCH",
            format!(
                "File {} looks like a .{} file, not a {} file",
                file_name,
                ext,
                kind.label()
            ),
        )),
        None => Err(ValidationError::new(
            "SIGNATURE_MISMATCH",
            format!("File {} is not a valid {} file", file_name, kind.label()),
        )),
    }
}

/// Reduces a client supplied filename to a safe display name.
///
/// The result is only used for headers and document titles, never as a path.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or("");

    if filename.contains("..") {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.').trim();

    // Limit length safely for UTF-8
    let mut end = sanitized.len().min(MAX_FILENAME_LEN);
    while !sanitized.is_char_boundary(end) {
        end -= 1;
    }

    if end == 0 {
        "file".to_string()
    } else {
        sanitized[..end].to_string()
    }
}

/// Filename without its extension, for naming derived outputs.
pub fn file_stem(filename: &str) -> String {
    let name = sanitize_filename(filename);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// Upper bound on the number of pages a selection may expand to.
pub const MAX_SELECTED_PAGES: usize = 100_000;

/// A parsed page list such as `"1-3,5,7-9"`, 1-based and in listed order.
///
/// Ranges are kept as bounds and only expanded once checked against a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    ranges: Vec<(u32, u32)>,
}

impl PageSelection {
    pub fn parse(list: &str) -> Result<Self, ValidationError> {
        let list = list.trim();
        if list.is_empty() {
            return Err(ValidationError::new("INVALID_PAGES", "No pages specified"));
        }

        let mut ranges = Vec::new();
        for part in list.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(ValidationError::new(
                    "INVALID_PAGES",
                    format!("Empty entry in page list '{}'", list),
                ));
            }

            match part.split_once('-') {
                Some((start, end)) => {
                    let start = parse_page_number(start, list)?;
                    let end = parse_page_number(end, list)?;
                    if start > end {
                        return Err(ValidationError::new(
                            "INVALID_PAGES",
                            format!("Descending page range '{}'", part),
                        ));
                    }
                    ranges.push((start, end));
                }
                None => {
                    let page = parse_page_number(part, list)?;
                    ranges.push((page, page));
                }
            }
        }

        Ok(Self { ranges })
    }

    /// Zero-based indices, checked against the document's page count.
    pub fn to_indices(&self, page_count: usize) -> Result<Vec<usize>, ValidationError> {
        let mut total = 0usize;
        for &(start, end) in &self.ranges {
            if end as usize > page_count {
                let page = if start as usize > page_count { start } else { end };
                return Err(ValidationError::new(
                    "PAGE_OUT_OF_RANGE",
                    format!(
                        "Page {} is out of range (document has {} pages)",
                        page, page_count
                    ),
                ));
            }
            total += (end - start) as usize + 1;
            if total > MAX_SELECTED_PAGES {
                return Err(ValidationError::new(
                    "TOO_MANY_PAGES",
                    format!("Page list selects more than {} pages", MAX_SELECTED_PAGES),
                ));
            }
        }

        let mut indices = Vec::with_capacity(total);
        for &(start, end) in &self.ranges {
            indices.extend((start as usize - 1)..end as usize);
        }
        Ok(indices)
    }
}

fn parse_page_number(raw: &str, list: &str) -> Result<u32, ValidationError> {
    let raw = raw.trim();
    match raw.parse::<u32>() {
        Ok(0) => Err(ValidationError::new(
            "INVALID_PAGES",
            "Page numbers start at 1",
        )),
        Ok(n) => Ok(n),
        Err(_) => Err(ValidationError::new(
            "INVALID_PAGES",
            format!("Invalid page number '{}' in '{}'", raw, list),
        )),
    }
}

/// Parses a rotation angle and normalizes it into `0..360`.
pub fn normalize_rotation(raw: &str) -> Result<i64, ValidationError> {
    let angle: i64 = raw.trim().parse().map_err(|_| {
        ValidationError::new("INVALID_ANGLE", format!("Invalid rotation angle '{}'", raw))
    })?;

    if angle % 90 != 0 {
        return Err(ValidationError::new(
            "INVALID_ANGLE",
            format!("Rotation angle must be a multiple of 90, got {}", angle),
        ));
    }

    Ok(angle.rem_euclid(360))
}

/// Parses an opacity in `[0, 1]`.
pub fn parse_opacity(raw: &str) -> Result<f32, ValidationError> {
    let value: f32 = raw.trim().parse().map_err(|_| {
        ValidationError::new("INVALID_OPACITY", format!("Invalid opacity '{}'", raw))
    })?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::new(
            "INVALID_OPACITY",
            format!("Opacity must be between 0 and 1, got {}", value),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_kind() {
        assert!(require_kind("a.pdf", InputKind::Pdf).is_ok());
        assert!(require_kind("A.PDF", InputKind::Pdf).is_ok());
        assert!(require_kind("photo.jpeg", InputKind::Jpeg).is_ok());
        assert!(require_kind("Main.java", InputKind::Java).is_ok());
        assert!(require_kind("lib.hpp", InputKind::Cpp).is_ok());

        let err = require_kind("notes.txt", InputKind::Pdf).unwrap_err();
        assert_eq!(err.code, "INVALID_EXTENSION");
        assert!(err.message.contains("notes.txt"));
        assert!(require_kind("pdf", InputKind::Pdf).is_err());
    }

    #[test]
    fn test_verify_signature() {
        assert!(verify_signature(b"%PDF-1.7\n%\xe2\xe3", "a.pdf", InputKind::Pdf).is_ok());
        assert!(verify_signature(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], "a.png", InputKind::Png).is_ok());
        assert!(verify_signature(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10], "a.jpg", InputKind::Jpeg).is_ok());

        let err = verify_signature(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], "a.jpg", InputKind::Jpeg).unwrap_err();
        assert_eq!(err.code, "SIGNATURE_MISMATCH");
        assert!(verify_signature(b"just some text", "a.pdf", InputKind::Pdf).is_err());
        assert!(verify_signature(b"", "a.pdf", InputKind::Pdf).is_err());

        assert!(verify_signature(b"#!/usr/bin/env python\nprint(1)", "a.py", InputKind::Python).is_ok());
        assert!(verify_signature(b"class A {\0}", "A.java", InputKind::Java).is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test.pdf"), "test.pdf");
        assert_eq!(sanitize_filename("my file.doc"), "my file.doc");
        assert_eq!(sanitize_filename("test<script>.pdf"), "test_script_.pdf");
        assert_eq!(sanitize_filename("测试.java"), "测试.java");
        assert_eq!(sanitize_filename("../../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\windows\\system32"), "system32");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename(""), "file");
        assert_eq!(sanitize_filename(&"a".repeat(300)).len(), 255);
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("HelloWorld.java"), "HelloWorld");
        assert_eq!(file_stem("dir/archive.tar.gz"), "archive.tar");
        assert_eq!(file_stem("README"), "README");
    }

    #[test]
    fn test_page_selection_parse() {
        let sel = PageSelection::parse("1-3,5,7-9").unwrap();
        assert_eq!(sel.to_indices(9).unwrap(), vec![0, 1, 2, 4, 6, 7, 8]);

        let sel = PageSelection::parse(" 4 , 2-2 ,1").unwrap();
        assert_eq!(sel.to_indices(4).unwrap(), vec![3, 1, 0]);

        for bad in ["", " ", "1,,2", "0", "a-b", "3-1", "1-", "-2", "1.5", "1-2-3"] {
            assert!(PageSelection::parse(bad).is_err(), "accepted '{}'", bad);
        }
    }

    #[test]
    fn test_page_selection_indices_are_zero_based() {
        let sel = PageSelection::parse("1-2").unwrap();
        assert_eq!(sel.to_indices(3).unwrap(), vec![0, 1]);

        let sel = PageSelection::parse("3").unwrap();
        assert_eq!(sel.to_indices(3).unwrap(), vec![2]);

        let err = PageSelection::parse("2,4").unwrap().to_indices(3).unwrap_err();
        assert_eq!(err.code, "PAGE_OUT_OF_RANGE");
        assert!(err.message.contains("Page 4"));
    }

    #[test]
    fn test_huge_ranges_are_checked_before_expanding() {
        let sel = PageSelection::parse("1-4294967295").unwrap();
        let err = sel.to_indices(3).unwrap_err();
        assert_eq!(err.code, "PAGE_OUT_OF_RANGE");
        assert!(err.message.contains("4294967295"));

        let sel = PageSelection::parse("9-4294967295").unwrap();
        assert!(sel.to_indices(3).unwrap_err().message.contains("Page 9"));

        // Repeats of a valid range still hit the overall cap.
        let list = vec!["1-1000"; MAX_SELECTED_PAGES / 1000 + 1].join(",");
        let err = PageSelection::parse(&list).unwrap().to_indices(1000).unwrap_err();
        assert_eq!(err.code, "TOO_MANY_PAGES");
    }

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation("90").unwrap(), 90);
        assert_eq!(normalize_rotation(" 180 ").unwrap(), 180);
        assert_eq!(normalize_rotation("-90").unwrap(), 270);
        assert_eq!(normalize_rotation("450").unwrap(), 90);
        assert_eq!(normalize_rotation("360").unwrap(), 0);
        assert!(normalize_rotation("45").is_err());
        assert!(normalize_rotation("ninety").is_err());
    }

    #[test]
    fn test_parse_opacity() {
        assert_eq!(parse_opacity("0.3").unwrap(), 0.3);
        assert_eq!(parse_opacity("1").unwrap(), 1.0);
        assert!(parse_opacity("1.5").is_err());
        assert!(parse_opacity("-0.1").is_err());
        assert!(parse_opacity("half").is_err());
    }
}
