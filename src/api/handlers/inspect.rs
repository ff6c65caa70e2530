use super::receive;
use crate::AppState;
use crate::api::error::AppError;
use crate::services::error::{ConvertResult, run_blocking};
use crate::services::ocr::{OcrEngines, OcrReport, recognize_image, recognize_pdf};
use crate::services::pdf::{open_pdf, page_count};
use crate::services::raster::{RasterFormat, data_uri, render_pages};
use crate::utils::validation::{InputKind, PageSelection, require_kind};
use axum::{
    Json,
    extract::{Multipart, State},
};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct PagePreview {
    /// 1-based page number
    pub page: u32,
    pub width: u32,
    pub height: u32,
    /// PNG as a `data:` URI
    pub image: String,
}

#[derive(Serialize, ToSchema)]
pub struct PreviewResponse {
    pub page_count: usize,
    pub pages: Vec<PagePreview>,
}

#[utoipa::path(
    post,
    path = "/api/ocr",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Extracted text", body = OcrReport),
        (status = 400, description = "Not a PDF, JPG or PNG", body = ErrorResponse),
        (status = 500, description = "OCR engine failure", body = ErrorResponse)
    ),
    tag = "inspect"
)]
pub async fn ocr(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<OcrReport>, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;
    let upload = form.file()?;

    let report = if require_kind(&upload.file_name, InputKind::Pdf).is_ok() {
        upload.check(InputKind::Pdf).await?;
        let engines = OcrEngines {
            renderer: state.renderer.as_ref(),
            recognizer: state.recognizer.as_ref(),
            dpi: state.config.render_dpi,
        };
        recognize_pdf(engines, &mut scope, upload.staged.path()).await?
    } else {
        let kind = if require_kind(&upload.file_name, InputKind::Png).is_ok() {
            InputKind::Png
        } else {
            InputKind::Jpeg
        };
        upload.check(kind).await.map_err(|_| {
            AppError::BadRequest(format!(
                "File {} is not a PDF, JPG or PNG file",
                upload.file_name
            ))
        })?;
        recognize_image(state.recognizer.as_ref(), upload.staged.path()).await?
    };

    info!(
        "🔍 OCR on {}: {} pages, {} recognized by {}",
        upload.file_name,
        report.pages,
        report.ocr_pages.len(),
        state.recognizer.name()
    );
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/api/preview",
    request_body(content = PagesUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Page thumbnails", body = PreviewResponse),
        (status = 400, description = "Not a PDF, or invalid page list", body = ErrorResponse),
        (status = 500, description = "Rendering failed", body = ErrorResponse)
    ),
    tag = "inspect"
)]
pub async fn preview(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PreviewResponse>, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;
    let upload = form.file()?;
    upload.check(InputKind::Pdf).await?;
    let selection = form.text("pages").map(PageSelection::parse).transpose()?;

    let counted = upload.staged.path().to_path_buf();
    let total = run_blocking(move || Ok(page_count(&open_pdf(&counted)?))).await?;

    let mut pages: Vec<u32> = match &selection {
        Some(selection) => selection
            .to_indices(total)?
            .into_iter()
            .map(|index| index as u32 + 1)
            .collect(),
        None => (1..=total as u32).collect(),
    };
    pages.truncate(state.config.preview_max_pages);

    let rendered = render_pages(
        state.renderer.as_ref(),
        &mut scope,
        upload.staged.path(),
        &pages,
        state.config.preview_dpi,
        RasterFormat::Png,
    )
    .await?;

    let previews = run_blocking(move || {
        rendered
            .iter()
            .map(|(page, image)| {
                let (uri, width, height) = data_uri(image.path(), RasterFormat::Png)?;
                Ok(PagePreview {
                    page: *page,
                    width,
                    height,
                    image: uri,
                })
            })
            .collect::<ConvertResult<Vec<_>>>()
    })
    .await?;

    Ok(Json(PreviewResponse {
        page_count: total,
        pages: previews,
    }))
}
