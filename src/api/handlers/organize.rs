use super::{PDF_MEDIA_TYPE, receive};
use crate::AppState;
use crate::api::error::AppError;
use crate::api::response::file_response;
use crate::services::error::run_blocking;
use crate::services::pdf::{open_pdf, page_count, pages, save_pdf};
use crate::services::staging::FileOrigin;
use crate::utils::validation::{InputKind, PageSelection, normalize_rotation};
use axum::{
    extract::{Multipart, State},
    response::Response,
};
use std::path::PathBuf;
use tracing::info;
use utoipa::ToSchema;

/// Two or more PDFs under the repeated `files` field.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct MergeUpload {
    #[schema(value_type = Vec<String>, format = Binary)]
    files: Vec<Vec<u8>>,
}

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct RotateUpload {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    /// Multiple of 90, negative values rotate counter-clockwise
    #[schema(example = 90)]
    angle: i64,
}

#[utoipa::path(
    post,
    path = "/api/merge",
    request_body(content = MergeUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Merged PDF", content_type = "application/pdf"),
        (status = 400, description = "Fewer than two PDFs, or a non-PDF upload", body = ErrorResponse)
    ),
    tag = "organize"
)]
pub async fn merge_pdfs(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;

    let mut uploads = form.files("files");
    if uploads.is_empty() {
        uploads = form.all_files().iter().collect();
    }
    if uploads.len() < 2 {
        return Err(AppError::BadRequest(
            "At least two PDF files are required to merge".to_string(),
        ));
    }
    for upload in &uploads {
        upload.check(InputKind::Pdf).await?;
    }

    let inputs: Vec<PathBuf> = uploads.iter().map(|u| u.staged.path().to_path_buf()).collect();
    let output = scope.allocate(FileOrigin::Output, "merged", "pdf");
    let out_path = output.path().to_path_buf();

    let total = run_blocking(move || {
        let paths: Vec<&std::path::Path> = inputs.iter().map(PathBuf::as_path).collect();
        let mut merged = pages::merge(&paths)?;
        save_pdf(&mut merged, &out_path)?;
        Ok(page_count(&merged))
    })
    .await?;

    info!("📎 Merged {} PDFs into {} pages", uploads.len(), total);
    file_response(scope, &output, PDF_MEDIA_TYPE, "merged.pdf").await
}

#[utoipa::path(
    post,
    path = "/api/split",
    request_body(content = PagesUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF with the selected pages, in listed order", content_type = "application/pdf"),
        (status = 400, description = "Malformed or out of range page list", body = ErrorResponse)
    ),
    tag = "organize"
)]
pub async fn split_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;
    let upload = form.file()?;
    upload.check(InputKind::Pdf).await?;
    let selection = PageSelection::parse(form.required_text("pages")?)?;

    let input = upload.staged.path().to_path_buf();
    let output = scope.allocate(FileOrigin::Output, "split", "pdf");
    let out_path = output.path().to_path_buf();

    let kept = run_blocking(move || {
        let mut doc = open_pdf(&input)?;
        let indices = selection.to_indices(page_count(&doc))?;
        pages::select(&mut doc, &indices)?;
        save_pdf(&mut doc, &out_path)?;
        Ok(indices.len())
    })
    .await?;

    info!("✂️ Split {} into {} pages", upload.file_name, kept);
    file_response(scope, &output, PDF_MEDIA_TYPE, "split.pdf").await
}

#[utoipa::path(
    post,
    path = "/api/delete-pages",
    request_body(content = PagesUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF without the listed pages", content_type = "application/pdf"),
        (status = 400, description = "Malformed page list, or every page listed", body = ErrorResponse)
    ),
    tag = "organize"
)]
pub async fn delete_pages(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;
    let upload = form.file()?;
    upload.check(InputKind::Pdf).await?;
    let selection = PageSelection::parse(form.required_text("pages")?)?;

    let input = upload.staged.path().to_path_buf();
    let output = scope.allocate(FileOrigin::Output, "edited", "pdf");
    let out_path = output.path().to_path_buf();

    let remaining = run_blocking(move || {
        let mut doc = open_pdf(&input)?;
        let indices = selection.to_indices(page_count(&doc))?;
        pages::delete(&mut doc, &indices)?;
        save_pdf(&mut doc, &out_path)?;
        Ok(page_count(&doc))
    })
    .await?;

    info!("🗑️ Deleted pages from {}, {} remaining", upload.file_name, remaining);
    file_response(scope, &output, PDF_MEDIA_TYPE, "edited.pdf").await
}

#[utoipa::path(
    post,
    path = "/api/compress",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Compressed PDF", content_type = "application/pdf"),
        (status = 400, description = "Not a PDF", body = ErrorResponse)
    ),
    tag = "organize"
)]
pub async fn compress_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;
    let upload = form.file()?;
    upload.check(InputKind::Pdf).await?;

    let input = upload.staged.path().to_path_buf();
    let output = scope.allocate(FileOrigin::Output, "compressed", "pdf");
    let out_path = output.path().to_path_buf();

    run_blocking(move || {
        let mut doc = open_pdf(&input)?;
        pages::compress(&mut doc);
        save_pdf(&mut doc, &out_path)
    })
    .await?;

    let before = tokio::fs::metadata(upload.staged.path()).await?.len();
    let after = tokio::fs::metadata(output.path()).await?.len();
    info!("🗜️ Compressed {}: {} -> {} bytes", upload.file_name, before, after);
    file_response(scope, &output, PDF_MEDIA_TYPE, "compressed.pdf").await
}

#[utoipa::path(
    post,
    path = "/api/rotate",
    request_body(content = RotateUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Rotated PDF", content_type = "application/pdf"),
        (status = 400, description = "Angle is not a multiple of 90", body = ErrorResponse)
    ),
    tag = "organize"
)]
pub async fn rotate_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;
    let upload = form.file()?;
    upload.check(InputKind::Pdf).await?;
    let angle = normalize_rotation(form.required_text("angle")?)?;

    let input = upload.staged.path().to_path_buf();
    let output = scope.allocate(FileOrigin::Output, "rotated", "pdf");
    let out_path = output.path().to_path_buf();

    run_blocking(move || {
        let mut doc = open_pdf(&input)?;
        pages::rotate(&mut doc, angle)?;
        save_pdf(&mut doc, &out_path)
    })
    .await?;

    info!("🔄 Rotated {} by {} degrees", upload.file_name, angle);
    file_response(scope, &output, PDF_MEDIA_TYPE, "rotated.pdf").await
}
