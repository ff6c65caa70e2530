use super::{PDF_MEDIA_TYPE, receive};
use crate::AppState;
use crate::api::error::AppError;
use crate::api::response::file_response;
use crate::services::error::run_blocking;
use crate::services::pdf::protection::{protect, unlock};
use crate::services::pdf::{open_pdf, save_pdf};
use crate::services::staging::FileOrigin;
use crate::utils::validation::InputKind;
use axum::{
    extract::{Multipart, State},
    response::Response,
};
use tracing::info;
use utoipa::ToSchema;

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct PasswordUpload {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    #[schema(format = Password)]
    password: String,
}

#[utoipa::path(
    post,
    path = "/api/protect",
    request_body(content = PasswordUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Password protected PDF", content_type = "application/pdf"),
        (status = 400, description = "Missing password", body = ErrorResponse),
        (status = 500, description = "Already encrypted or unreadable PDF", body = ErrorResponse)
    ),
    tag = "security"
)]
pub async fn protect_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;
    let upload = form.file()?;
    upload.check(InputKind::Pdf).await?;
    let password = form
        .raw_text("password")
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("Password is required".to_string()))?
        .to_string();

    let input = upload.staged.path().to_path_buf();
    let output = scope.allocate(FileOrigin::Output, "protected", "pdf");
    let out_path = output.path().to_path_buf();

    run_blocking(move || {
        let mut doc = open_pdf(&input)?;
        protect(&mut doc, &password)?;
        save_pdf(&mut doc, &out_path)
    })
    .await?;

    info!("🔒 Protected {}", upload.file_name);
    file_response(scope, &output, PDF_MEDIA_TYPE, "protected.pdf").await
}

#[utoipa::path(
    post,
    path = "/api/unlock",
    request_body(content = PasswordUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF with encryption removed", content_type = "application/pdf"),
        (status = 400, description = "Wrong password, or the PDF is not password protected", body = ErrorResponse),
        (status = 500, description = "Unreadable PDF", body = ErrorResponse)
    ),
    tag = "security"
)]
pub async fn unlock_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;
    let upload = form.file()?;
    upload.check(InputKind::Pdf).await?;
    let password = form
        .raw_text("password")
        .ok_or_else(|| AppError::BadRequest("Password is required".to_string()))?
        .to_string();

    let input = upload.staged.path().to_path_buf();
    let output = scope.allocate(FileOrigin::Output, "unlocked", "pdf");
    let out_path = output.path().to_path_buf();

    run_blocking(move || {
        let mut doc = unlock(&input, &password)?;
        save_pdf(&mut doc, &out_path)
    })
    .await?;

    info!("🔓 Unlocked {}", upload.file_name);
    file_response(scope, &output, PDF_MEDIA_TYPE, "unlocked.pdf").await
}
