//! Stamping generated overlay pages (watermarks, signatures, page numbers) onto
//! existing documents.
//!
//! An overlay is drawn with [`Canvas`] as a standalone PDF, one overlay page per
//! target page and sized to match it. Each overlay page is then turned into a Form
//! XObject and painted over its target page.

use super::canvas::{Canvas, PageSize};
use super::fonts::Font;
use super::image::ImageXObject;
use super::numbering::{NumberPosition, PageNumberFormat};
use super::{PageBox, inherited_attribute, open_pdf, page_box, page_ids, resolve, save_pdf};
use crate::services::error::{ConvertError, ConvertResult};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const WATERMARK_FONT_SIZE: f32 = 50.0;
const WATERMARK_GRAY: f32 = 0.5;
const WATERMARK_MARGIN: f32 = 40.0;
/// Largest share of the page width a watermark image may cover.
const WATERMARK_IMAGE_SCALE: f32 = 0.4;

const SIGNATURE_FONT_SIZE: f32 = 24.0;
const SIGNATURE_ORIGIN: (f32, f32) = (50.0, 50.0);

const PAGE_NUMBER_FONT_SIZE: f32 = 10.0;
const PAGE_NUMBER_BOTTOM: f32 = 30.0;
const PAGE_NUMBER_SIDE: f32 = 40.0;

/// Which pages of the target document receive an overlay page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampTarget {
    AllPages,
    LastPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatermarkPosition {
    #[default]
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl FromStr for WatermarkPosition {
    type Err = ConvertError;

    fn from_str(s: &str) -> ConvertResult<Self> {
        match s.trim() {
            "center" => Ok(WatermarkPosition::Center),
            "top-left" => Ok(WatermarkPosition::TopLeft),
            "top-right" => Ok(WatermarkPosition::TopRight),
            "bottom-left" => Ok(WatermarkPosition::BottomLeft),
            "bottom-right" => Ok(WatermarkPosition::BottomRight),
            other => Err(ConvertError::invalid(format!(
                "Unknown watermark position '{}'",
                other
            ))),
        }
    }
}

impl WatermarkPosition {
    /// Lower-left corner for a `width` × `height` box on a page of `page` size.
    fn place(self, page: PageSize, width: f32, height: f32) -> (f32, f32) {
        let left = WATERMARK_MARGIN;
        let right = page.width - WATERMARK_MARGIN - width;
        let bottom = WATERMARK_MARGIN;
        let top = page.height - WATERMARK_MARGIN - height;
        match self {
            WatermarkPosition::Center => ((page.width - width) / 2.0, (page.height - height) / 2.0),
            WatermarkPosition::TopLeft => (left, top),
            WatermarkPosition::TopRight => (right, top),
            WatermarkPosition::BottomLeft => (left, bottom),
            WatermarkPosition::BottomRight => (right, bottom),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatermarkOptions {
    pub text: Option<String>,
    pub image: Option<ImageXObject>,
    pub position: WatermarkPosition,
    pub opacity: f32,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            text: None,
            image: None,
            position: WatermarkPosition::Center,
            opacity: 0.3,
        }
    }
}

fn page_size(b: &PageBox) -> PageSize {
    PageSize::new(b.width, b.height)
}

pub fn watermark_overlay(boxes: &[PageBox], options: WatermarkOptions) -> Canvas {
    let mut canvas = Canvas::new();
    let image = options
        .image
        .map(|img| (img.width() as f32, img.height() as f32, canvas.add_image(img)));

    for page in boxes.iter().map(page_size) {
        canvas.begin_page(page);
        canvas.save_state();
        canvas.set_fill_alpha(options.opacity);

        if let Some((natural_w, natural_h, handle)) = image {
            let scale = (page.width * WATERMARK_IMAGE_SCALE / natural_w)
                .min(page.height * WATERMARK_IMAGE_SCALE / natural_h)
                .min(1.0);
            let (w, h) = (natural_w * scale, natural_h * scale);
            let (x, y) = options.position.place(page, w, h);
            canvas.draw_image(handle, x, y, w, h);
        }

        if let Some(text) = options.text.as_deref().filter(|t| !t.trim().is_empty()) {
            canvas.set_fill_gray(WATERMARK_GRAY);
            match options.position {
                WatermarkPosition::Center => {
                    canvas.translate(page.width / 2.0, page.height / 2.0);
                    canvas.rotate(45.0);
                    canvas.draw_centred_text(Font::Helvetica, WATERMARK_FONT_SIZE, 0.0, 0.0, text);
                }
                corner => {
                    let width = Font::Helvetica.text_width(text, WATERMARK_FONT_SIZE);
                    let (x, y) = corner.place(page, width, WATERMARK_FONT_SIZE);
                    canvas.draw_text(Font::Helvetica, WATERMARK_FONT_SIZE, x, y, text);
                }
            }
        }

        canvas.restore_state();
    }
    canvas
}

pub fn signature_overlay(page: &PageBox, text: &str) -> Canvas {
    let mut canvas = Canvas::new();
    canvas.begin_page(page_size(page));
    let (x, y) = SIGNATURE_ORIGIN;
    canvas.draw_text(Font::HelveticaOblique, SIGNATURE_FONT_SIZE, x, y, text);
    canvas
}

pub fn page_number_overlay(
    boxes: &[PageBox],
    format: PageNumberFormat,
    position: NumberPosition,
    start: u32,
) -> Canvas {
    let mut canvas = Canvas::new();
    for (index, page) in boxes.iter().map(page_size).enumerate() {
        canvas.begin_page(page);
        let label = format.label(start.saturating_add(index as u32));
        let font = Font::Helvetica;
        match position {
            NumberPosition::BottomLeft => {
                canvas.draw_text(font, PAGE_NUMBER_FONT_SIZE, PAGE_NUMBER_SIDE, PAGE_NUMBER_BOTTOM, &label)
            }
            NumberPosition::BottomCenter => canvas.draw_centred_text(
                font,
                PAGE_NUMBER_FONT_SIZE,
                page.width / 2.0,
                PAGE_NUMBER_BOTTOM,
                &label,
            ),
            NumberPosition::BottomRight => canvas.draw_right_text(
                font,
                PAGE_NUMBER_FONT_SIZE,
                page.width - PAGE_NUMBER_SIDE,
                PAGE_NUMBER_BOTTOM,
                &label,
            ),
        }
    }
    canvas
}

/// Draws an overlay for the target pages of `input`, writes it to `overlay_path`,
/// stamps it and saves the result to `output`.
pub fn apply_overlay<F>(
    input: &Path,
    overlay_path: &Path,
    output: &Path,
    target: StampTarget,
    build: F,
) -> ConvertResult<usize>
where
    F: FnOnce(&[PageBox]) -> Canvas,
{
    let mut doc = open_pdf(input)?;
    let pages = page_ids(&doc);
    let targets: Vec<ObjectId> = match target {
        StampTarget::AllPages => pages,
        StampTarget::LastPage => pages.last().copied().into_iter().collect(),
    };
    if targets.is_empty() {
        return Err(ConvertError::invalid("PDF has no pages"));
    }

    let boxes: Vec<PageBox> = targets.iter().map(|&id| page_box(&doc, id)).collect();
    build(&boxes).save(overlay_path)?;

    let overlay = Document::load(overlay_path)?;
    stamp(&mut doc, overlay, &targets)?;
    save_pdf(&mut doc, output)?;
    Ok(targets.len())
}

/// Paints overlay page `i` over `targets[i]`.
pub fn stamp(target: &mut Document, mut overlay: Document, targets: &[ObjectId]) -> ConvertResult<()> {
    overlay.renumber_objects_with(target.max_id + 1);
    let overlay_pages = page_ids(&overlay);
    if overlay_pages.len() != targets.len() {
        return Err(ConvertError::Task(format!(
            "overlay has {} pages for {} target pages",
            overlay_pages.len(),
            targets.len()
        )));
    }

    let mut forms = Vec::with_capacity(overlay_pages.len());
    for &page_id in &overlay_pages {
        let content = overlay.get_page_content(page_id)?;
        let resources = match overlay.get_dictionary(page_id)?.get(b"Resources") {
            Ok(obj) => resolve(&overlay, obj)
                .cloned()
                .unwrap_or_else(|| Object::Dictionary(Dictionary::new())),
            Err(_) => Object::Dictionary(Dictionary::new()),
        };
        forms.push((content, resources, page_box(&overlay, page_id)));
    }

    target.max_id = target.max_id.max(overlay.max_id);
    target.objects.extend(overlay.objects);

    for ((content, resources, bbox), &page_id) in forms.into_iter().zip(targets) {
        let form = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), bbox.width.into(), bbox.height.into()],
                "Resources" => resources,
            },
            content,
        );
        let form_id = target.add_object(form);
        let name = attach_xobject(target, page_id, form_id)?;
        let origin = page_box(target, page_id);
        wrap_contents(target, page_id, &name, origin)?;
    }

    // The overlay's own catalog and page objects are unreachable now.
    target.prune_objects();
    debug!("Stamped {} overlay pages", targets.len());
    Ok(())
}

/// Registers `form_id` in the page's own `/XObject` resources under a fresh name.
fn attach_xobject(doc: &mut Document, page_id: ObjectId, form_id: ObjectId) -> ConvertResult<Vec<u8>> {
    let mut resources = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|obj| resolve(doc, &obj).and_then(|o| o.as_dict().ok()).cloned())
        .unwrap_or_default();
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_default();

    let name = (1..)
        .map(|n| format!("PmOverlay{}", n))
        .find(|candidate| !xobjects.has(candidate.as_bytes()))
        .unwrap_or_else(|| "PmOverlay".to_string());
    xobjects.set(name.as_str(), form_id);
    resources.set("XObject", xobjects);
    doc.get_dictionary_mut(page_id)?.set("Resources", resources);
    Ok(name.into_bytes())
}

/// Wraps the existing content in `q … Q` and paints the form XObject after it.
fn wrap_contents(doc: &mut Document, page_id: ObjectId, name: &[u8], origin: PageBox) -> ConvertResult<()> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let open = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let paint = Content {
        operations: vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), origin.x.into(), origin.y.into()],
            ),
            Operation::new("Do", vec![Object::Name(name.to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let close = doc.add_object(Stream::new(Dictionary::new(), paint.encode()?));

    let mut contents: Vec<Object> = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open));
    contents.extend(existing);
    contents.push(Object::Reference(close));
    doc.get_dictionary_mut(page_id)?.set("Contents", contents);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pdf::page_count;
    use crate::services::pdf::test_support::{numbered_document, page_text};

    #[test]
    fn test_watermark_position_parse() {
        assert_eq!("top-right".parse::<WatermarkPosition>().unwrap(), WatermarkPosition::TopRight);
        assert!("middle".parse::<WatermarkPosition>().unwrap_err().is_client_error());
    }

    #[test]
    fn test_place_corners() {
        let page = PageSize::LETTER;
        assert_eq!(WatermarkPosition::BottomLeft.place(page, 100.0, 50.0), (40.0, 40.0));
        assert_eq!(WatermarkPosition::TopRight.place(page, 100.0, 50.0), (472.0, 702.0));
        assert_eq!(WatermarkPosition::Center.place(page, 112.0, 92.0), (250.0, 350.0));
    }

    #[test]
    fn test_stamp_keeps_original_text_and_adds_overlay() {
        let mut doc = numbered_document(2);
        let targets = page_ids(&doc);
        let boxes: Vec<PageBox> = targets.iter().map(|&id| page_box(&doc, id)).collect();
        let overlay = page_number_overlay(&boxes, PageNumberFormat::NumericPage, NumberPosition::BottomRight, 5)
            .into_document()
            .unwrap();

        stamp(&mut doc, overlay, &targets).unwrap();
        assert_eq!(page_count(&doc), 2);

        let page_one = doc.get_dictionary(targets[0]).unwrap();
        let xobjects = page_one
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|r| r.get(b"XObject"))
            .and_then(Object::as_dict)
            .unwrap();
        assert!(xobjects.has(b"PmOverlay1"));
        assert_eq!(page_one.get(b"Contents").and_then(Object::as_array).unwrap().len(), 3);

        assert!(page_text(&doc, 1).contains("Page 1"));
        assert!(page_text(&doc, 2).contains("Page 2"));
    }

    #[test]
    fn test_page_numbers_saturate_at_largest_label() {
        let boxes = vec![PageBox { x: 0.0, y: 0.0, width: 612.0, height: 792.0 }; 3];
        let doc = page_number_overlay(&boxes, PageNumberFormat::Numeric, NumberPosition::BottomCenter, u32::MAX)
            .into_document()
            .unwrap();
        assert_eq!(page_count(&doc), 3);
        assert!(page_text(&doc, 3).contains("4294967295"));
    }

    #[test]
    fn test_stamp_rejects_page_mismatch() {
        let mut doc = numbered_document(2);
        let targets = page_ids(&doc);
        let overlay = numbered_document(1);
        assert!(stamp(&mut doc, overlay, &targets).is_err());
    }

    #[test]
    fn test_apply_overlay_on_last_page_only() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        numbered_document(3).save(&input).unwrap();
        let overlay_path = dir.path().join("overlay.pdf");
        let output = dir.path().join("out.pdf");

        let stamped = apply_overlay(&input, &overlay_path, &output, StampTarget::LastPage, |boxes| {
            assert_eq!(boxes.len(), 1);
            signature_overlay(&boxes[0], "Jane Doe")
        })
        .unwrap();
        assert_eq!(stamped, 1);

        let doc = Document::load(&output).unwrap();
        let pages = page_ids(&doc);
        assert_eq!(pages.len(), 3);
        let has_overlay = |id| {
            doc.get_dictionary(id)
                .unwrap()
                .get(b"Resources")
                .and_then(Object::as_dict)
                .map(|r| r.has(b"XObject"))
                .unwrap_or(false)
        };
        assert!(!has_overlay(pages[0]));
        assert!(has_overlay(pages[2]));
    }

    #[test]
    fn test_watermark_overlay_one_page_per_target() {
        let boxes = vec![
            PageBox { x: 0.0, y: 0.0, width: 612.0, height: 792.0 },
            PageBox { x: 0.0, y: 0.0, width: 842.0, height: 595.0 },
        ];
        let options = WatermarkOptions {
            text: Some("CONFIDENTIAL".to_string()),
            ..Default::default()
        };
        let doc = watermark_overlay(&boxes, options).into_document().unwrap();
        let pages = page_ids(&doc);
        assert_eq!(pages.len(), 2);
        assert_eq!(page_box(&doc, pages[1]).width, 842.0);
    }
}
