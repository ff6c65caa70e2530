use super::{PDF_MEDIA_TYPE, ZIP_MEDIA_TYPE, receive};
use crate::AppState;
use crate::api::error::AppError;
use crate::api::form::UploadedFile;
use crate::api::response::file_response;
use crate::services::error::{ConvertResult, run_blocking};
use crate::services::office::{self, DOCX_MEDIA_TYPE, XLSX_MEDIA_TYPE};
use crate::services::pdf::image::images_to_pdf;
use crate::services::pdf::{open_pdf, page_count};
use crate::services::raster::{RasterFormat, render_pages, zip_pages};
use crate::services::staging::FileOrigin;
use crate::utils::validation::InputKind;
use axum::{
    extract::{Multipart, State},
    response::Response,
};
use std::path::{Path, PathBuf};
use tracing::info;
use utoipa::ToSchema;

/// One image under `file`, or several under `files`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ImagesUpload {
    #[schema(value_type = Option<String>, format = Binary)]
    file: Option<Vec<u8>>,
    #[schema(value_type = Option<Vec<String>>, format = Binary)]
    files: Option<Vec<Vec<u8>>>,
}

#[utoipa::path(
    post,
    path = "/api/pdf-to-jpg",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "JPEG of a single page document, or a ZIP with one JPEG per page", content_type = "image/jpeg"),
        (status = 400, description = "Not a PDF", body = ErrorResponse),
        (status = 500, description = "Rendering failed", body = ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn pdf_to_jpg(state: State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    rasterize(state, multipart, RasterFormat::Jpeg).await
}

#[utoipa::path(
    post,
    path = "/api/pdf-to-png",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PNG of a single page document, or a ZIP with one PNG per page", content_type = "image/png"),
        (status = 400, description = "Not a PDF", body = ErrorResponse),
        (status = 500, description = "Rendering failed", body = ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn pdf_to_png(state: State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    rasterize(state, multipart, RasterFormat::Png).await
}

/// Renders every page; a single page is returned bare, more pages as a ZIP.
async fn rasterize(
    State(state): State<AppState>,
    multipart: Multipart,
    format: RasterFormat,
) -> Result<Response, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;
    let upload = form.file()?;
    upload.check(InputKind::Pdf).await?;

    let input = upload.staged.path().to_path_buf();
    let counted = input.clone();
    let total = run_blocking(move || Ok(page_count(&open_pdf(&counted)?))).await?;
    if total == 0 {
        return Err(AppError::BadRequest("PDF has no pages".to_string()));
    }

    let pages: Vec<u32> = (1..=total as u32).collect();
    let mut rendered = render_pages(
        state.renderer.as_ref(),
        &mut scope,
        &input,
        &pages,
        state.config.render_dpi,
        format,
    )
    .await?;

    info!(
        "🖼️ Rendered {} pages of {} as {}",
        rendered.len(),
        upload.file_name,
        format.extension()
    );

    if rendered.len() == 1 {
        let (page, image) = rendered.remove(0);
        let name = format!("page_{}.{}", page, format.extension());
        return file_response(scope, &image, format.media_type(), &name).await;
    }

    let output = scope.allocate(FileOrigin::Output, "pages", "zip");
    zip_pages(rendered, format, output.path().to_path_buf()).await?;
    file_response(scope, &output, ZIP_MEDIA_TYPE, "pages.zip").await
}

#[utoipa::path(
    post,
    path = "/api/jpg-to-pdf",
    request_body(content = ImagesUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF with one page per image", content_type = "application/pdf"),
        (status = 400, description = "Not a JPEG image", body = ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn jpg_to_pdf(state: State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    images_to_document(state, multipart, InputKind::Jpeg).await
}

#[utoipa::path(
    post,
    path = "/api/png-to-pdf",
    request_body(content = ImagesUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF with one page per image", content_type = "application/pdf"),
        (status = 400, description = "Not a PNG image", body = ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn png_to_pdf(state: State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    images_to_document(state, multipart, InputKind::Png).await
}

async fn images_to_document(
    State(state): State<AppState>,
    multipart: Multipart,
    kind: InputKind,
) -> Result<Response, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;
    let uploads: &[UploadedFile] = form.all_files();
    if uploads.is_empty() {
        return Err(AppError::BadRequest("No file provided".to_string()));
    }
    for upload in uploads {
        upload.check(kind).await?;
    }

    let inputs: Vec<PathBuf> = uploads.iter().map(|u| u.staged.path().to_path_buf()).collect();
    let output = scope.allocate(FileOrigin::Output, "converted", "pdf");
    let out_path = output.path().to_path_buf();

    let pages = run_blocking(move || images_to_pdf(inputs.as_slice(), &out_path)).await?;

    info!("📄 Converted {} {} images to PDF", pages, kind.label());
    file_response(scope, &output, PDF_MEDIA_TYPE, "converted.pdf").await
}

/// One staged input through one blocking conversion into one staged output.
struct DocumentConversion {
    input: InputKind,
    output_extension: &'static str,
    media_type: &'static str,
    download_name: &'static str,
    convert: fn(&Path, &Path) -> ConvertResult<()>,
}

impl DocumentConversion {
    async fn run(self, state: &AppState, multipart: Multipart) -> Result<Response, AppError> {
        let (mut scope, form) = receive(state, multipart).await?;
        let upload = form.file()?;
        upload.check(self.input).await?;

        let input = upload.staged.path().to_path_buf();
        let output = scope.allocate(FileOrigin::Output, "converted", self.output_extension);
        let out_path = output.path().to_path_buf();
        let convert = self.convert;

        run_blocking(move || convert(&input, &out_path)).await?;

        info!("📄 Converted {} to {}", upload.file_name, self.download_name);
        file_response(scope, &output, self.media_type, self.download_name).await
    }
}

#[utoipa::path(
    post,
    path = "/api/pdf-to-word",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Word document with one paragraph per text line", content_type = "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        (status = 400, description = "Not a PDF", body = ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn pdf_to_word(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    DocumentConversion {
        input: InputKind::Pdf,
        output_extension: "docx",
        media_type: DOCX_MEDIA_TYPE,
        download_name: "converted.docx",
        convert: office::pdf_to_word,
    }
    .run(&state, multipart)
    .await
}

#[utoipa::path(
    post,
    path = "/api/word-to-pdf",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF text layout of the document", content_type = "application/pdf"),
        (status = 400, description = "Not a .docx document", body = ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn word_to_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    DocumentConversion {
        input: InputKind::Docx,
        output_extension: "pdf",
        media_type: PDF_MEDIA_TYPE,
        download_name: "converted.pdf",
        convert: office::word_to_pdf,
    }
    .run(&state, multipart)
    .await
}

#[utoipa::path(
    post,
    path = "/api/excel-to-pdf",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF text layout of the active sheet", content_type = "application/pdf"),
        (status = 400, description = "Not an .xlsx workbook", body = ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn excel_to_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    DocumentConversion {
        input: InputKind::Xlsx,
        output_extension: "pdf",
        media_type: PDF_MEDIA_TYPE,
        download_name: "converted.pdf",
        convert: office::excel_to_pdf,
    }
    .run(&state, multipart)
    .await
}

#[utoipa::path(
    post,
    path = "/api/pdf-to-excel",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Workbook with a single \"PDF Content\" sheet", content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (status = 400, description = "Not a PDF", body = ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn pdf_to_excel(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    DocumentConversion {
        input: InputKind::Pdf,
        output_extension: "xlsx",
        media_type: XLSX_MEDIA_TYPE,
        download_name: "converted.xlsx",
        convert: office::pdf_to_excel,
    }
    .run(&state, multipart)
    .await
}

