#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use http_body_util::BodyExt;
use pdf_master::config::AppConfig;
use pdf_master::services::error::ConvertResult;
use pdf_master::services::ocr::TextRecognizer;
use pdf_master::services::pdf::canvas::{Canvas, PageSize};
use pdf_master::services::pdf::fonts::Font;
use pdf_master::services::raster::{PageRenderer, RasterFormat};
use pdf_master::services::staging::StagingArea;
use pdf_master::{AppState, create_app};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Writes a small solid image instead of rasterizing.
pub struct SolidRenderer;

#[async_trait::async_trait]
impl PageRenderer for SolidRenderer {
    async fn render_page(
        &self,
        _pdf: &Path,
        page: u32,
        _dpi: u32,
        format: RasterFormat,
        output: &Path,
    ) -> ConvertResult<()> {
        let img = image::RgbImage::from_pixel(10 + page, 20, image::Rgb([240, 240, 240]));
        let fmt = match format {
            RasterFormat::Png => image::ImageFormat::Png,
            RasterFormat::Jpeg => image::ImageFormat::Jpeg,
        };
        img.save_with_format(output, fmt)?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "solid"
    }
}

/// Recognizes every image as the same sentence.
pub struct FixedRecognizer;

#[async_trait::async_trait]
impl TextRecognizer for FixedRecognizer {
    async fn recognize(&self, _image: &Path) -> ConvertResult<String> {
        Ok("Recognized scan text".to_string())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

pub struct TestApp {
    pub app: Router,
    pub staging_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::development())
    }

    pub fn with_config(mut config: AppConfig) -> Self {
        let staging_dir = tempfile::tempdir().unwrap();
        config.upload_dir = staging_dir.path().to_path_buf();

        let state = AppState {
            config,
            staging: StagingArea::new(staging_dir.path()),
            datastore: None,
            renderer: Arc::new(SolidRenderer),
            recognizer: Arc::new(FixedRecognizer),
        };

        Self {
            app: create_app(state),
            staging_dir,
        }
    }

    pub async fn post(&self, uri: &str, form: MultipartForm) -> Response<Body> {
        self.app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("Content-Type", form.content_type())
                    .body(Body::from(form.into_body()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    /// Files currently present in the staging directory.
    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging_dir.path()).unwrap().count()
    }
}

/// Hand-built `multipart/form-data` body.
pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: "---------------------------pdfmaster0123456789".to_string(),
            body: Vec::new(),
        }
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary, name, filename, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn pdf(self, name: &str, filename: &str, data: &[u8]) -> Self {
        self.file(name, filename, "application/pdf", data)
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn into_body(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.body
    }
}

/// A PDF whose page N shows the text "Page N".
pub fn numbered_pdf(pages: usize) -> Vec<u8> {
    let mut canvas = Canvas::new();
    for n in 1..=pages {
        canvas.begin_page(PageSize::LETTER);
        canvas.draw_text(Font::Helvetica, 24.0, 72.0, 700.0, &format!("Page {}", n));
    }
    let mut doc = canvas.into_document().unwrap();
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// A PDF with a text page followed by a page without any text layer.
pub fn half_scanned_pdf() -> Vec<u8> {
    let mut canvas = Canvas::new();
    canvas.begin_page(PageSize::LETTER);
    canvas.draw_text(Font::Helvetica, 12.0, 72.0, 700.0, "Typed text");
    canvas.begin_page(PageSize::LETTER);
    let mut doc = canvas.into_document().unwrap();
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_image(width, height, image::ImageFormat::Png)
}

pub fn jpg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_image(width, height, image::ImageFormat::Jpeg)
}

fn encode_image(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        width,
        height,
        image::Rgb([30, 90, 200]),
    ));
    let mut cursor = std::io::Cursor::new(Vec::new());
    img.write_to(&mut cursor, format).unwrap();
    cursor.into_inner()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn load_pdf(bytes: &[u8]) -> lopdf::Document {
    lopdf::Document::load_mem(bytes).unwrap()
}

pub fn page_count(doc: &lopdf::Document) -> usize {
    doc.get_pages().len()
}

pub fn page_text(doc: &lopdf::Document, page: u32) -> String {
    doc.extract_text(&[page]).unwrap_or_default()
}
