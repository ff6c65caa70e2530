use lopdf::Document;
use tracing::debug;

/// Text layer of every page, in page order. Pages whose text cannot be decoded
/// yield an empty string.
pub fn page_texts(doc: &Document) -> Vec<String> {
    doc.get_pages()
        .keys()
        .map(|&number| match doc.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                debug!("No extractable text on page {}: {}", number, e);
                String::new()
            }
        })
        .collect()
}

/// Non-blank lines of a page's text, trimmed.
pub fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}

pub fn has_text(text: &str) -> bool {
    text.chars().any(|c| !c.is_whitespace())
}
