//! Text recognition: the PDF text layer first, an OCR engine for pages without one.

use crate::services::error::{ConvertError, ConvertResult, run_blocking};
use crate::services::pdf::{open_pdf, text};
use crate::services::raster::{PageRenderer, RasterFormat, render_pages};
use crate::services::staging::RequestScope;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

/// Trait for OCR engines
#[async_trait::async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognizes the text in an image file
    async fn recognize(&self, image: &Path) -> ConvertResult<String>;

    /// Check if the engine is available/healthy
    async fn health_check(&self) -> bool;

    /// Whether recognition is configured at all.
    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Tesseract command line engine.
pub struct TesseractRecognizer {
    binary: String,
    language: String,
}

impl TesseractRecognizer {
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }
}

#[async_trait::async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, image: &Path) -> ConvertResult<String> {
        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ConvertError::tool("tesseract", format!("failed to start: {}", e)))?;

        if !output.status.success() {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            error!("tesseract failed: {}", err_msg);
            return Err(ConvertError::tool("tesseract", err_msg.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn health_check(&self) -> bool {
        match Command::new(&self.binary).arg("--version").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    fn name(&self) -> &'static str {
        "tesseract"
    }
}

/// No-op recognizer (when OCR is disabled): only text layers are reported.
pub struct NoOpRecognizer;

#[async_trait::async_trait]
impl TextRecognizer for NoOpRecognizer {
    async fn recognize(&self, _image: &Path) -> ConvertResult<String> {
        Ok(String::new())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Create a recognizer based on configuration
pub fn create_recognizer(engine: &str, binary: &str, language: &str) -> Arc<dyn TextRecognizer> {
    match engine {
        "tesseract" => {
            info!("Using tesseract OCR engine (language: {})", language);
            Arc::new(TesseractRecognizer::new(binary, language))
        }
        "noop" | "none" | "disabled" => {
            info!("OCR engine disabled");
            Arc::new(NoOpRecognizer)
        }
        other => {
            warn!("Unknown OCR engine '{}', OCR disabled", other);
            Arc::new(NoOpRecognizer)
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OcrReport {
    /// Text of every page, each followed by a blank line
    pub text: String,
    /// Number of pages examined
    pub pages: usize,
    /// 1-based pages whose text came from the OCR engine
    pub ocr_pages: Vec<u32>,
}

/// Everything the OCR pipeline needs besides the input.
pub struct OcrEngines<'a> {
    pub renderer: &'a dyn PageRenderer,
    pub recognizer: &'a dyn TextRecognizer,
    pub dpi: u32,
}

/// Extracts the text of a PDF, recognizing pages that have no text layer.
pub async fn recognize_pdf(
    engines: OcrEngines<'_>,
    scope: &mut RequestScope,
    pdf: &Path,
) -> ConvertResult<OcrReport> {
    let path: PathBuf = pdf.to_path_buf();
    let mut texts = run_blocking(move || Ok(text::page_texts(&open_pdf(&path)?))).await?;

    let mut ocr_pages = Vec::new();
    if engines.recognizer.is_enabled() {
        let blank: Vec<u32> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !text::has_text(t))
            .map(|(i, _)| i as u32 + 1)
            .collect();

        if !blank.is_empty() {
            debug!("Recognizing {} pages without a text layer", blank.len());
            let rendered =
                render_pages(engines.renderer, scope, pdf, &blank, engines.dpi, RasterFormat::Png).await?;
            for (page, image) in rendered {
                texts[page as usize - 1] = engines.recognizer.recognize(image.path()).await?;
                ocr_pages.push(page);
            }
        }
    }

    Ok(OcrReport {
        text: join_pages(&texts),
        pages: texts.len(),
        ocr_pages,
    })
}

/// Recognizes a single uploaded image.
pub async fn recognize_image(recognizer: &dyn TextRecognizer, image: &Path) -> ConvertResult<OcrReport> {
    if !recognizer.is_enabled() {
        return Err(ConvertError::tool("ocr", "no OCR engine is configured for image input"));
    }
    let text = recognizer.recognize(image).await?;
    Ok(OcrReport {
        text: join_pages(&[text]),
        pages: 1,
        ocr_pages: vec![1],
    })
}

fn join_pages(texts: &[String]) -> String {
    texts.iter().map(|t| format!("{}\n\n", t)).collect()
}
