//! Rasterizing PDF pages into images.

use crate::services::error::{ConvertError, ConvertResult, run_blocking};
use crate::services::staging::{FileOrigin, RequestScope, StagedFile};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg => "image/jpeg",
        }
    }

    fn pdftocairo_flag(self) -> &'static str {
        match self {
            RasterFormat::Png => "-png",
            RasterFormat::Jpeg => "-jpeg",
        }
    }
}

/// Trait for PDF page rasterizers
#[async_trait::async_trait]
pub trait PageRenderer: Send + Sync {
    /// Renders page `page` (1-based) of `pdf` to `output` at `dpi`.
    async fn render_page(
        &self,
        pdf: &Path,
        page: u32,
        dpi: u32,
        format: RasterFormat,
        output: &Path,
    ) -> ConvertResult<()>;

    /// Check if the renderer is available
    async fn health_check(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Renderer backed by Poppler's `pdftocairo`.
pub struct PdftocairoRenderer {
    binary: String,
}

impl PdftocairoRenderer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait::async_trait]
impl PageRenderer for PdftocairoRenderer {
    async fn render_page(
        &self,
        pdf: &Path,
        page: u32,
        dpi: u32,
        format: RasterFormat,
        output: &Path,
    ) -> ConvertResult<()> {
        // pdftocairo appends the extension itself.
        let base: PathBuf = output.with_extension("");
        let produced = base.with_extension(format.extension());

        let result = Command::new(&self.binary)
            .arg(format.pdftocairo_flag())
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-singlefile")
            .arg(pdf)
            .arg(&base)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ConvertError::tool("pdftocairo", format!("failed to start: {}", e)))?;

        if !result.status.success() {
            let err_msg = String::from_utf8_lossy(&result.stderr);
            error!("pdftocairo failed: {}", err_msg);
            return Err(ConvertError::tool("pdftocairo", err_msg.trim()));
        }

        if produced != output {
            tokio::fs::rename(&produced, output).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        Command::new(&self.binary)
            .arg("-v")
            .output()
            .await
            .is_ok()
    }

    fn name(&self) -> &'static str {
        "pdftocairo"
    }
}

/// Renderer used when rasterizing is disabled; every render fails.
pub struct NoOpRenderer;

#[async_trait::async_trait]
impl PageRenderer for NoOpRenderer {
    async fn render_page(
        &self,
        _pdf: &Path,
        _page: u32,
        _dpi: u32,
        _format: RasterFormat,
        _output: &Path,
    ) -> ConvertResult<()> {
        Err(ConvertError::tool("renderer", "page rendering is not available"))
    }

    async fn health_check(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Create a renderer for the given engine name
pub fn create_renderer(engine: &str, binary: &str) -> Arc<dyn PageRenderer> {
    match engine {
        "none" | "noop" | "disabled" => {
            info!("Page rendering disabled");
            Arc::new(NoOpRenderer)
        }
        _ => {
            info!("Using pdftocairo page renderer ({})", binary);
            Arc::new(PdftocairoRenderer::new(binary))
        }
    }
}

/// Renders `pages` (1-based) into request-scoped intermediate files.
pub async fn render_pages(
    renderer: &dyn PageRenderer,
    scope: &mut RequestScope,
    pdf: &Path,
    pages: &[u32],
    dpi: u32,
    format: RasterFormat,
) -> ConvertResult<Vec<(u32, StagedFile)>> {
    let mut rendered = Vec::with_capacity(pages.len());
    for &page in pages {
        let staged = scope.allocate(FileOrigin::Intermediate, &format!("page{}", page), format.extension());
        renderer
            .render_page(pdf, page, dpi, format, staged.path())
            .await?;
        debug!("Rendered page {} with {}", page, renderer.name());
        rendered.push((page, staged));
    }
    Ok(rendered)
}

/// Packs rendered pages into a ZIP archive named `page_<n>.<ext>`.
pub async fn zip_pages(
    pages: Vec<(u32, StagedFile)>,
    format: RasterFormat,
    output: PathBuf,
) -> ConvertResult<()> {
    run_blocking(move || {
        let file = std::fs::File::create(&output)?;
        let mut zip = ZipWriter::new(file);
        // Image payloads are already compressed.
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        for (page, staged) in &pages {
            let data = std::fs::read(staged.path())?;
            zip.start_file(format!("page_{}.{}", page, format.extension()), options)?;
            zip.write_all(&data)?;
        }
        zip.finish()?;
        Ok(())
    })
    .await
}

/// A rendered page as a `data:` URI together with its pixel size.
pub fn data_uri(path: &Path, format: RasterFormat) -> ConvertResult<(String, u32, u32)> {
    let data = std::fs::read(path)?;
    let (width, height) = image::load_from_memory(&data)
        .map(|img| (img.width(), img.height()))?;
    let uri = format!("data:{};base64,{}", format.media_type(), STANDARD.encode(&data));
    Ok((uri, width, height))
}
