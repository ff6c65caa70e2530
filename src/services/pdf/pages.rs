//! Page level operations: merge, split, delete, rotate and compress.

use super::{inherited_attribute, materialize_inherited, open_pdf, page_ids, rebuild_page_tree};
use crate::services::error::{ConvertError, ConvertResult};
use lopdf::{Document, Object, dictionary};
use std::path::Path;
use tracing::debug;

/// Concatenates the pages of every input, in input order.
pub fn merge(inputs: &[&Path]) -> ConvertResult<Document> {
    if inputs.len() < 2 {
        return Err(ConvertError::invalid("At least two PDF files are required to merge"));
    }

    let mut merged = Document::with_version("1.5");
    let mut kids = Vec::new();

    for path in inputs {
        let mut doc = open_pdf(path)?;
        doc.renumber_objects_with(merged.max_id + 1);

        let pages = page_ids(&doc);
        materialize_inherited(&mut doc, &pages)?;
        debug!("Merging {} pages from {}", pages.len(), path.display());

        kids.extend(pages.into_iter().map(Object::Reference));
        merged.max_id = doc.max_id;
        merged.objects.extend(doc.objects);
    }

    let pages_id = merged.new_object_id();
    for kid in &kids {
        let id = kid.as_reference()?;
        merged.get_dictionary_mut(id)?.set("Parent", pages_id);
    }

    let count = kids.len() as i64;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    // Catalogs and page nodes of the inputs are now unreachable.
    merged.prune_objects();
    merged.renumber_objects();
    Ok(merged)
}

/// Keeps the pages at `indices` (zero-based) in the listed order.
pub fn select(doc: &mut Document, indices: &[usize]) -> ConvertResult<()> {
    let pages = page_ids(doc);
    let selected = indices
        .iter()
        .map(|&i| {
            pages.get(i).copied().ok_or_else(|| {
                ConvertError::invalid(format!("Page {} is out of range", i + 1))
            })
        })
        .collect::<ConvertResult<Vec<_>>>()?;
    if selected.is_empty() {
        return Err(ConvertError::invalid("No pages selected"));
    }
    rebuild_page_tree(doc, &selected)
}

/// Removes the pages at `indices` (zero-based). Removing every page is rejected.
pub fn delete(doc: &mut Document, indices: &[usize]) -> ConvertResult<()> {
    let pages = page_ids(doc);
    if let Some(&bad) = indices.iter().find(|&&i| i >= pages.len()) {
        return Err(ConvertError::invalid(format!("Page {} is out of range", bad + 1)));
    }
    let remaining: Vec<_> = pages
        .iter()
        .enumerate()
        .filter(|(i, _)| !indices.contains(i))
        .map(|(_, id)| *id)
        .collect();
    if remaining.is_empty() {
        return Err(ConvertError::invalid("Cannot delete all pages of the document"));
    }
    rebuild_page_tree(doc, &remaining)
}

/// Adds `angle` degrees (already normalized to a multiple of 90) to every page.
pub fn rotate(doc: &mut Document, angle: i64) -> ConvertResult<()> {
    for page_id in page_ids(doc) {
        let current = inherited_attribute(doc, page_id, b"Rotate")
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0);
        let rotation = (current + angle).rem_euclid(360);
        doc.get_dictionary_mut(page_id)?.set("Rotate", rotation);
    }
    Ok(())
}

/// Drops unreferenced objects and empty streams, then Flate-compresses the rest.
pub fn compress(doc: &mut Document) {
    let pruned = doc.prune_objects();
    let emptied = doc.delete_zero_length_streams();
    doc.compress();
    doc.renumber_objects();
    debug!(
        "Compressed document ({} unreferenced objects, {} empty streams removed)",
        pruned.len(),
        emptied.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pdf::page_count;
    use crate::services::pdf::test_support::{numbered_document, page_text};

    fn write(doc: &mut Document, dir: &Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        doc.save(&path).unwrap();
        path
    }

    #[test]
    fn test_merge_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(&mut numbered_document(2), dir.path(), "a.pdf");
        let b = write(&mut numbered_document(3), dir.path(), "b.pdf");

        let merged = merge(&[b.as_path(), a.as_path()]).unwrap();
        assert_eq!(page_count(&merged), 5);
        assert!(page_text(&merged, 3).contains("Page 3"));
        assert!(page_text(&merged, 4).contains("Page 1"));
        assert!(page_text(&merged, 5).contains("Page 2"));
    }

    #[test]
    fn test_merge_needs_two_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(&mut numbered_document(1), dir.path(), "a.pdf");
        assert!(merge(&[a.as_path()]).unwrap_err().is_client_error());
    }

    #[test]
    fn test_select_first_two_of_three() {
        let mut doc = numbered_document(3);
        select(&mut doc, &[0, 1]).unwrap();
        assert_eq!(page_count(&doc), 2);
        assert!(page_text(&doc, 1).contains("Page 1"));
        assert!(page_text(&doc, 2).contains("Page 2"));
    }

    #[test]
    fn test_select_out_of_range() {
        let mut doc = numbered_document(2);
        assert!(select(&mut doc, &[4]).unwrap_err().is_client_error());
    }

    #[test]
    fn test_delete_pages() {
        let mut doc = numbered_document(4);
        delete(&mut doc, &[1, 2]).unwrap();
        assert_eq!(page_count(&doc), 2);
        assert!(page_text(&doc, 2).contains("Page 4"));
    }

    #[test]
    fn test_delete_every_page_is_rejected() {
        let mut doc = numbered_document(2);
        let err = delete(&mut doc, &[0, 1]).unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(page_count(&doc), 2);
    }

    #[test]
    fn test_rotate_adds_to_existing_rotation() {
        let mut doc = numbered_document(2);
        let first = page_ids(&doc)[0];
        doc.get_dictionary_mut(first).unwrap().set("Rotate", 270i64);

        rotate(&mut doc, 180).unwrap();
        let rotations: Vec<i64> = page_ids(&doc)
            .into_iter()
            .map(|id| doc.get_dictionary(id).unwrap().get(b"Rotate").unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(rotations, vec![90, 180]);
    }

    #[test]
    fn test_compress_keeps_pages() {
        let mut doc = numbered_document(3);
        doc.add_object(dictionary! { "Orphan" => true });
        let before = doc.objects.len();
        compress(&mut doc);
        assert!(doc.objects.len() < before);
        assert_eq!(page_count(&doc), 3);
        assert!(page_text(&doc, 2).contains("Page 2"));
    }
}
