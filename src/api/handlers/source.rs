use super::{PDF_MEDIA_TYPE, receive};
use crate::AppState;
use crate::api::error::AppError;
use crate::api::response::file_response;
use crate::services::error::run_blocking;
use crate::services::listing::{SourceLanguage, read_source, render_notebook, render_source};
use crate::services::staging::FileOrigin;
use crate::utils::validation::{InputKind, file_stem};
use axum::{
    extract::{Multipart, State},
    response::Response,
};
use tracing::info;

/// What a listing endpoint renders.
#[derive(Debug, Clone, Copy)]
enum Listing {
    Source(SourceLanguage),
    Notebook,
}

impl Listing {
    fn input_kind(self) -> InputKind {
        match self {
            Listing::Source(SourceLanguage::Java) => InputKind::Java,
            Listing::Source(SourceLanguage::Python) => InputKind::Python,
            Listing::Source(SourceLanguage::Cpp) => InputKind::Cpp,
            Listing::Source(SourceLanguage::Xml) => InputKind::Xml,
            Listing::Notebook => InputKind::Notebook,
        }
    }
}

async fn render_listing(
    state: &AppState,
    multipart: Multipart,
    listing: Listing,
) -> Result<Response, AppError> {
    let (mut scope, form) = receive(state, multipart).await?;
    let upload = form.file()?;
    let kind = listing.input_kind();
    upload.check(kind).await?;

    let input = upload.staged.path().to_path_buf();
    let file_name = upload.file_name.clone();
    let output = scope.allocate(FileOrigin::Output, "listing", "pdf");
    let out_path = output.path().to_path_buf();

    let pages = run_blocking(move || {
        let text = read_source(&input, kind.label())?;
        match listing {
            Listing::Source(language) => render_source(&text, &file_name, language, &out_path),
            Listing::Notebook => render_notebook(&text, &file_name, &out_path),
        }
    })
    .await?;

    let download_name = format!("{}.pdf", file_stem(&upload.file_name));
    info!("📜 Rendered {} into {} pages", upload.file_name, pages);
    file_response(scope, &output, PDF_MEDIA_TYPE, &download_name).await
}

#[utoipa::path(
    post,
    path = "/api/java-to-pdf",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Numbered source listing", content_type = "application/pdf"),
        (status = 400, description = "Not a UTF-8 .java file", body = ErrorResponse)
    ),
    tag = "source"
)]
pub async fn java_to_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    render_listing(&state, multipart, Listing::Source(SourceLanguage::Java)).await
}

#[utoipa::path(
    post,
    path = "/api/python-to-pdf",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Numbered source listing", content_type = "application/pdf"),
        (status = 400, description = "Not a UTF-8 .py file", body = ErrorResponse)
    ),
    tag = "source"
)]
pub async fn python_to_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    render_listing(&state, multipart, Listing::Source(SourceLanguage::Python)).await
}

#[utoipa::path(
    post,
    path = "/api/cpp-to-pdf",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Numbered source listing", content_type = "application/pdf"),
        (status = 400, description = "Not a UTF-8 C/C++ source or header", body = ErrorResponse)
    ),
    tag = "source"
)]
pub async fn cpp_to_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    render_listing(&state, multipart, Listing::Source(SourceLanguage::Cpp)).await
}

#[utoipa::path(
    post,
    path = "/api/xml-to-pdf",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Numbered XML listing", content_type = "application/pdf"),
        (status = 400, description = "Not a UTF-8 .xml file", body = ErrorResponse)
    ),
    tag = "source"
)]
pub async fn xml_to_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    render_listing(&state, multipart, Listing::Source(SourceLanguage::Xml)).await
}

#[utoipa::path(
    post,
    path = "/api/notebook-to-pdf",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Rendered notebook cells and outputs", content_type = "application/pdf"),
        (status = 400, description = "Not a valid .ipynb notebook", body = ErrorResponse)
    ),
    tag = "source"
)]
pub async fn notebook_to_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    render_listing(&state, multipart, Listing::Notebook).await
}
