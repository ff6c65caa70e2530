//! PDF document operations on top of `lopdf`.

pub mod canvas;
pub mod fonts;
pub mod image;
pub mod numbering;
pub mod overlay;
pub mod pages;
pub mod protection;
pub mod text;

use crate::services::error::{ConvertError, ConvertResult};
use lopdf::{Document, Object, ObjectId};
use std::path::Path;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Loads a PDF, failing with [`ConvertError::Encrypted`] when it needs a password.
pub fn open_pdf(path: &Path) -> ConvertResult<Document> {
    let mut doc = Document::load(path)?;
    if doc.is_encrypted() {
        // Owner-password-only files open with an empty user password.
        doc.decrypt("").map_err(|_| ConvertError::Encrypted)?;
    }
    Ok(doc)
}

pub fn save_pdf(doc: &mut Document, path: &Path) -> ConvertResult<()> {
    doc.save(path)?;
    Ok(())
}

/// Page object ids in document order.
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

pub fn page_count(doc: &Document) -> usize {
    doc.get_pages().len()
}

/// Follows a single indirect reference.
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub fn as_number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Looks up `key` on the page, then on each `/Parent` up the tree.
pub fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok();
    // Depth bound guards against cyclic Parent chains.
    for _ in 0..64 {
        let dict = current?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .ok()
            .and_then(|parent| doc.get_dictionary(parent).ok());
    }
    None
}

/// Copies inherited attributes onto the pages so they survive a page tree rebuild.
pub fn materialize_inherited(doc: &mut Document, pages: &[ObjectId]) -> ConvertResult<()> {
    for &page_id in pages {
        let mut missing = Vec::new();
        {
            let dict = doc.get_dictionary(page_id)?;
            for key in INHERITABLE {
                if !dict.has(key) {
                    if let Some(value) = inherited_attribute(doc, page_id, key) {
                        missing.push((key, value));
                    }
                }
            }
        }
        if missing.is_empty() {
            continue;
        }
        let dict = doc.get_dictionary_mut(page_id)?;
        for (key, value) in missing {
            dict.set(key, value);
        }
    }
    Ok(())
}

/// A page's visible area in default user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PageBox {
    const LETTER: PageBox = PageBox {
        x: 0.0,
        y: 0.0,
        width: 612.0,
        height: 792.0,
    };
}

/// The page's MediaBox, falling back to US-Letter when missing or malformed.
pub fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let Some(media_box) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return PageBox::LETTER;
    };
    let Some(Object::Array(values)) = resolve(doc, &media_box) else {
        return PageBox::LETTER;
    };
    let numbers: Vec<f32> = values
        .iter()
        .filter_map(|v| resolve(doc, v).and_then(as_number))
        .collect();
    match numbers.as_slice() {
        [x1, y1, x2, y2] if (x2 - x1).abs() > 0.0 && (y2 - y1).abs() > 0.0 => PageBox {
            x: x1.min(*x2),
            y: y1.min(*y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        },
        _ => PageBox::LETTER,
    }
}

/// Makes `pages` (in this order) the only pages of the document.
///
/// Inherited attributes are copied onto each page and every page hangs directly off
/// the root page node. A page listed twice is duplicated. Outlines are dropped since
/// they may point at removed pages; unreachable objects are pruned.
pub fn rebuild_page_tree(doc: &mut Document, pages: &[ObjectId]) -> ConvertResult<()> {
    materialize_inherited(doc, pages)?;

    let root_pages = doc
        .catalog()?
        .get(b"Pages")
        .and_then(Object::as_reference)?;

    let mut kids = Vec::with_capacity(pages.len());
    let mut seen = std::collections::HashSet::new();
    for &page_id in pages {
        let id = if seen.insert(page_id) {
            page_id
        } else {
            let copy = doc.get_dictionary(page_id)?.clone();
            doc.add_object(copy)
        };
        doc.get_dictionary_mut(id)?.set("Parent", root_pages);
        kids.push(Object::Reference(id));
    }

    let count = kids.len() as i64;
    let root = doc.get_dictionary_mut(root_pages)?;
    root.set("Kids", kids);
    root.set("Count", count);
    for key in INHERITABLE {
        root.remove(key);
    }

    if let Ok(catalog) = doc.catalog_mut() {
        catalog.remove(b"Outlines");
    }

    doc.prune_objects();
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_inherited_attributes_are_materialized() {
        let mut doc = numbered_document(2);
        let pages = page_ids(&doc);
        let root = doc.catalog().unwrap().get(b"Pages").unwrap().as_reference().unwrap();

        // Move the MediaBox of page 1 up to the root node.
        let media_box = doc.get_dictionary_mut(pages[0]).unwrap().remove(b"MediaBox").unwrap();
        doc.get_dictionary_mut(root).unwrap().set("MediaBox", media_box);
        assert!(!doc.get_dictionary(pages[0]).unwrap().has(b"MediaBox"));
        assert_eq!(page_box(&doc, pages[0]).width, 612.0);

        materialize_inherited(&mut doc, &pages).unwrap();
        assert!(doc.get_dictionary(pages[0]).unwrap().has(b"MediaBox"));
    }

    #[test]
    fn test_page_box_falls_back_to_letter() {
        let mut doc = numbered_document(1);
        let page = page_ids(&doc)[0];
        doc.get_dictionary_mut(page)
            .unwrap()
            .set("MediaBox", vec![0.into(), 0.into()]);
        assert_eq!(page_box(&doc, page), PageBox::LETTER);

        doc.get_dictionary_mut(page).unwrap().set(
            "MediaBox",
            vec![10.into(), 20.into(), 310.into(), 420.into()],
        );
        let b = page_box(&doc, page);
        assert_eq!((b.x, b.y, b.width, b.height), (10.0, 20.0, 300.0, 400.0));
    }

    #[test]
    fn test_rebuild_keeps_order_and_duplicates() {
        let mut doc = numbered_document(3);
        let pages = page_ids(&doc);
        rebuild_page_tree(&mut doc, &[pages[2], pages[0], pages[2]]).unwrap();

        assert_eq!(page_count(&doc), 3);
        assert!(page_text(&doc, 1).contains("Page 3"));
        assert!(page_text(&doc, 2).contains("Page 1"));
        assert!(page_text(&doc, 3).contains("Page 3"));
    }

    #[test]
    fn test_rebuild_prunes_removed_pages_and_outlines() {
        let mut doc = numbered_document(3);
        let pages = page_ids(&doc);
        let outlines = doc.add_object(dictionary! { "Type" => "Outlines" });
        doc.catalog_mut().unwrap().set("Outlines", outlines);

        rebuild_page_tree(&mut doc, &[pages[1]]).unwrap();
        assert_eq!(page_count(&doc), 1);
        assert!(doc.get_object(pages[0]).is_err());
        assert!(doc.get_object(outlines).is_err());
        assert!(!doc.catalog().unwrap().has(b"Outlines"));
    }
}
