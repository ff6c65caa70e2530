//! A small drawing surface that produces new PDF documents.
//!
//! Generated documents (text layouts, code listings, overlays) are written through
//! [`Canvas`]; it keeps per-page resource bookkeeping so every page only lists the
//! fonts, images and graphics states it actually uses.

use crate::services::error::ConvertResult;
use crate::services::pdf::fonts::{Font, encode_text};
use crate::services::pdf::image::ImageXObject;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };

    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Handle to an image registered with [`Canvas::add_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHandle(usize);

impl ImageHandle {
    fn resource_name(self) -> String {
        format!("Im{}", self.0 + 1)
    }
}

#[derive(Debug)]
struct CanvasPage {
    size: PageSize,
    operations: Vec<Operation>,
    fonts: BTreeSet<Font>,
    images: BTreeSet<usize>,
    /// Resource name → fill alpha.
    graphics_states: BTreeMap<String, f32>,
}

impl CanvasPage {
    fn new(size: PageSize) -> Self {
        Self {
            size,
            operations: Vec::new(),
            fonts: BTreeSet::new(),
            images: BTreeSet::new(),
            graphics_states: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Canvas {
    pages: Vec<CanvasPage>,
    images: Vec<ImageXObject>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new page; later drawing calls target it.
    pub fn begin_page(&mut self, size: PageSize) {
        self.pages.push(CanvasPage::new(size));
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Size of the current page (US-Letter when no page was started yet).
    pub fn page_size(&self) -> PageSize {
        self.pages
            .last()
            .map(|p| p.size)
            .unwrap_or(PageSize::LETTER)
    }

    fn page(&mut self) -> &mut CanvasPage {
        if self.pages.is_empty() {
            self.begin_page(PageSize::LETTER);
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn push(&mut self, operator: &str, operands: Vec<Object>) {
        self.page().operations.push(Operation::new(operator, operands));
    }

    pub fn save_state(&mut self) {
        self.push("q", vec![]);
    }

    pub fn restore_state(&mut self) {
        self.push("Q", vec![]);
    }

    pub fn translate(&mut self, x: f32, y: f32) {
        self.push(
            "cm",
            vec![1.into(), 0.into(), 0.into(), 1.into(), x.into(), y.into()],
        );
    }

    /// Rotates the coordinate system counter-clockwise by `degrees`.
    pub fn rotate(&mut self, degrees: f32) {
        let (sin, cos) = degrees.to_radians().sin_cos();
        self.push(
            "cm",
            vec![cos.into(), sin.into(), (-sin).into(), cos.into(), 0.into(), 0.into()],
        );
    }

    pub fn set_fill_gray(&mut self, gray: f32) {
        self.push("g", vec![gray.into()]);
    }

    pub fn set_fill_rgb(&mut self, r: f32, g: f32, b: f32) {
        self.push("rg", vec![r.into(), g.into(), b.into()]);
    }

    pub fn set_stroke_gray(&mut self, gray: f32) {
        self.push("G", vec![gray.into()]);
    }

    /// Sets the fill alpha through an `/ExtGState` resource.
    pub fn set_fill_alpha(&mut self, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        let name = format!("GS{}", (alpha * 1000.0).round() as u32);
        self.page().graphics_states.insert(name.clone(), alpha);
        self.push("gs", vec![Object::Name(name.into_bytes())]);
    }

    /// Draws `text` with its baseline starting at (`x`, `y`).
    pub fn draw_text(&mut self, font: Font, size: f32, x: f32, y: f32, text: &str) {
        self.page().fonts.insert(font);
        self.push("BT", vec![]);
        self.push(
            "Tf",
            vec![Object::Name(font.resource_name().as_bytes().to_vec()), size.into()],
        );
        self.push("Td", vec![x.into(), y.into()]);
        self.push(
            "Tj",
            vec![Object::String(encode_text(text), lopdf::StringFormat::Literal)],
        );
        self.push("ET", vec![]);
    }

    pub fn draw_centred_text(&mut self, font: Font, size: f32, x: f32, y: f32, text: &str) {
        let width = font.text_width(text, size);
        self.draw_text(font, size, x - width / 2.0, y, text);
    }

    pub fn draw_right_text(&mut self, font: Font, size: f32, x: f32, y: f32, text: &str) {
        let width = font.text_width(text, size);
        self.draw_text(font, size, x - width, y, text);
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.push("m", vec![x1.into(), y1.into()]);
        self.push("l", vec![x2.into(), y2.into()]);
        self.push("S", vec![]);
    }

    pub fn add_image(&mut self, image: ImageXObject) -> ImageHandle {
        self.images.push(image);
        ImageHandle(self.images.len() - 1)
    }

    /// Paints an image scaled into the rectangle at (`x`, `y`) of size `w` × `h`.
    pub fn draw_image(&mut self, handle: ImageHandle, x: f32, y: f32, w: f32, h: f32) {
        self.page().images.insert(handle.0);
        self.save_state();
        self.push(
            "cm",
            vec![w.into(), 0.into(), 0.into(), h.into(), x.into(), y.into()],
        );
        self.push("Do", vec![Object::Name(handle.resource_name().into_bytes())]);
        self.restore_state();
    }

    /// Builds the document. Fonts and images are shared across pages.
    pub fn into_document(mut self) -> ConvertResult<Document> {
        if self.pages.is_empty() {
            self.begin_page(PageSize::LETTER);
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_ids: BTreeMap<Font, ObjectId> = Font::ALL
            .iter()
            .filter(|font| self.pages.iter().any(|p| p.fonts.contains(font)))
            .map(|&font| (font, doc.add_object(font.dictionary())))
            .collect();

        let mut image_ids = Vec::with_capacity(self.images.len());
        for image in &self.images {
            image_ids.push(image.embed(&mut doc)?);
        }

        let mut kids = Vec::with_capacity(self.pages.len());
        for page in self.pages {
            let resources = page_resources(&page, &font_ids, &image_ids);
            let content = Content {
                operations: page.operations,
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    page.size.width.into(),
                    page.size.height.into(),
                ],
                "Contents" => content_id,
                "Resources" => resources,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        Ok(doc)
    }

    pub fn save(self, path: &Path) -> ConvertResult<()> {
        let mut doc = self.into_document()?;
        doc.save(path)?;
        Ok(())
    }
}

fn page_resources(
    page: &CanvasPage,
    font_ids: &BTreeMap<Font, ObjectId>,
    image_ids: &[ObjectId],
) -> Dictionary {
    let mut resources = Dictionary::new();

    if !page.fonts.is_empty() {
        let mut fonts = Dictionary::new();
        for font in &page.fonts {
            if let Some(id) = font_ids.get(font) {
                fonts.set(font.resource_name(), *id);
            }
        }
        resources.set("Font", fonts);
    }

    if !page.images.is_empty() {
        let mut xobjects = Dictionary::new();
        for &index in &page.images {
            xobjects.set(ImageHandle(index).resource_name(), image_ids[index]);
        }
        resources.set("XObject", xobjects);
    }

    if !page.graphics_states.is_empty() {
        let mut states = Dictionary::new();
        for (name, alpha) in &page.graphics_states {
            states.set(
                name.as_str(),
                dictionary! {
                    "Type" => "ExtGState",
                    "ca" => *alpha,
                    "CA" => *alpha,
                },
            );
        }
        resources.set("ExtGState", states);
    }

    resources
}

/// Writes lines top to bottom, starting a new page when the cursor runs out.
pub struct TextFlow {
    pub font: Font,
    pub font_size: f32,
    pub margin: f32,
    pub leading: f32,
    /// New page once the cursor drops below this y coordinate.
    pub bottom: f32,
    y: f32,
}

impl TextFlow {
    pub fn new(font: Font, font_size: f32, margin: f32, leading: f32) -> Self {
        Self {
            font,
            font_size,
            margin,
            leading,
            bottom: margin,
            y: PageSize::LETTER.height - margin,
        }
    }

    pub fn cursor(&self) -> f32 {
        self.y
    }

    pub fn advance(&mut self, by: f32) {
        self.y -= by;
    }

    /// Forces the next line onto a fresh page.
    pub fn new_page(&mut self, canvas: &mut Canvas) {
        canvas.begin_page(PageSize::LETTER);
        self.y = PageSize::LETTER.height - self.margin;
    }

    /// Breaks the page if the next line would fall below `bottom`.
    pub fn ensure_room(&mut self, canvas: &mut Canvas) {
        if canvas.page_count() == 0 {
            canvas.begin_page(PageSize::LETTER);
        }
        if self.y < self.bottom {
            self.new_page(canvas);
        }
    }

    pub fn write_line(&mut self, canvas: &mut Canvas, text: &str) {
        self.ensure_room(canvas);
        canvas.draw_text(self.font, self.font_size, self.margin, self.y, text);
        self.y -= self.leading;
    }
}

/// Truncates to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
