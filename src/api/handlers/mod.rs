pub mod annotate;
pub mod convert;
pub mod health;
pub mod inspect;
pub mod organize;
pub mod protection;
pub mod source;

use crate::AppState;
use crate::api::error::AppError;
use crate::api::form::UploadForm;
use crate::services::staging::RequestScope;
use axum::extract::Multipart;
use utoipa::ToSchema;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";
pub const ZIP_MEDIA_TYPE: &str = "application/zip";

/// Opens a staging scope for the request and stages every uploaded file into it.
///
/// On error the scope is dropped here, removing whatever was already staged.
pub(crate) async fn receive(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<(RequestScope, UploadForm), AppError> {
    let mut scope = state.staging.scope();
    let form = UploadForm::read(&mut multipart, &mut scope).await?;
    Ok((scope, form))
}

/// Single file upload.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct FileUpload {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

/// Single file upload with a page list such as `1-3,5`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct PagesUpload {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    #[schema(example = "1-3,5")]
    pages: String,
}

#[derive(serde::Serialize, ToSchema)]
pub struct ErrorResponse {
    pub detail: String,
}
