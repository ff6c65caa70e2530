use super::{PDF_MEDIA_TYPE, receive};
use crate::AppState;
use crate::api::error::AppError;
use crate::api::response::file_response;
use crate::services::error::run_blocking;
use crate::services::pdf::image::ImageXObject;
use crate::services::pdf::numbering::{NumberPosition, PageNumberFormat, parse_start_number};
use crate::services::pdf::overlay::{
    StampTarget, WatermarkOptions, WatermarkPosition, apply_overlay, page_number_overlay,
    signature_overlay, watermark_overlay,
};
use crate::services::staging::FileOrigin;
use crate::utils::validation::{InputKind, parse_opacity};
use axum::{
    extract::{Multipart, State},
    response::Response,
};
use tracing::info;
use utoipa::ToSchema;

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct WatermarkUpload {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    text: Option<String>,
    /// JPG or PNG stamped on every page
    #[schema(value_type = Option<String>, format = Binary)]
    image: Option<Vec<u8>>,
    /// center, top-left, top-right, bottom-left or bottom-right
    #[schema(example = "center")]
    position: Option<String>,
    /// Between 0 and 1, defaults to 0.3
    #[schema(example = 0.3)]
    opacity: Option<f32>,
}

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct SignUpload {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    signature_text: String,
}

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct PageNumbersUpload {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    /// numeric, numeric-page, roman-lower, roman-lower-page, roman-upper or roman-upper-page
    #[schema(example = "numeric")]
    format: Option<String>,
    /// bottom-left, bottom-center or bottom-right
    #[schema(example = "bottom-center")]
    position: Option<String>,
    /// Number printed on the first page
    #[schema(example = 1)]
    start: Option<u32>,
}

#[utoipa::path(
    post,
    path = "/api/watermark",
    request_body(content = WatermarkUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Watermarked PDF", content_type = "application/pdf"),
        (status = 400, description = "Neither text nor image, or invalid position/opacity", body = ErrorResponse)
    ),
    tag = "annotate"
)]
pub async fn watermark_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;
    let upload = form
        .named_file("file")
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;
    upload.check(InputKind::Pdf).await?;

    let text = form.text("text").map(str::to_string);
    let image = form.named_file("image");
    if text.is_none() && image.is_none() {
        return Err(AppError::BadRequest(
            "Either watermark text or an image is required".to_string(),
        ));
    }
    if let Some(image) = image {
        image.check(InputKind::Image).await?;
    }

    let position = match form.text("position") {
        Some(raw) => raw.parse::<WatermarkPosition>()?,
        None => WatermarkPosition::default(),
    };
    let opacity = match form.text("opacity") {
        Some(raw) => parse_opacity(raw)?,
        None => WatermarkOptions::default().opacity,
    };

    let input = upload.staged.path().to_path_buf();
    let image_path = image.map(|i| i.staged.path().to_path_buf());
    let overlay = scope.allocate(FileOrigin::Intermediate, "watermark", "pdf");
    let output = scope.allocate(FileOrigin::Output, "watermarked", "pdf");
    let (overlay_path, out_path) = (overlay.path().to_path_buf(), output.path().to_path_buf());

    let pages = run_blocking(move || {
        let image = image_path.as_deref().map(ImageXObject::open).transpose()?;
        let options = WatermarkOptions {
            text,
            image,
            position,
            opacity,
        };
        apply_overlay(&input, &overlay_path, &out_path, StampTarget::AllPages, |boxes| {
            watermark_overlay(boxes, options)
        })
    })
    .await?;

    info!("💧 Watermarked {} pages of {}", pages, upload.file_name);
    file_response(scope, &output, PDF_MEDIA_TYPE, "watermarked.pdf").await
}

#[utoipa::path(
    post,
    path = "/api/sign",
    request_body(content = SignUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF with the signature text on its last page", content_type = "application/pdf"),
        (status = 400, description = "Missing signature text", body = ErrorResponse)
    ),
    tag = "annotate"
)]
pub async fn sign_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;
    let upload = form.file()?;
    upload.check(InputKind::Pdf).await?;
    let signature = form.required_text("signature_text")?.to_string();

    let input = upload.staged.path().to_path_buf();
    let overlay = scope.allocate(FileOrigin::Intermediate, "signature", "pdf");
    let output = scope.allocate(FileOrigin::Output, "signed", "pdf");
    let (overlay_path, out_path) = (overlay.path().to_path_buf(), output.path().to_path_buf());

    run_blocking(move || {
        apply_overlay(&input, &overlay_path, &out_path, StampTarget::LastPage, |boxes| {
            signature_overlay(&boxes[0], &signature)
        })
    })
    .await?;

    info!("✍️ Signed {}", upload.file_name);
    file_response(scope, &output, PDF_MEDIA_TYPE, "signed.pdf").await
}

#[utoipa::path(
    post,
    path = "/api/page-numbers",
    request_body(content = PageNumbersUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF with a number on every page", content_type = "application/pdf"),
        (status = 400, description = "Unknown format or position, or start outside 1..=1000000", body = ErrorResponse)
    ),
    tag = "annotate"
)]
pub async fn add_page_numbers(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (mut scope, form) = receive(&state, multipart).await?;
    let upload = form.file()?;
    upload.check(InputKind::Pdf).await?;

    let format = match form.text("format") {
        Some(raw) => raw.parse::<PageNumberFormat>()?,
        None => PageNumberFormat::default(),
    };
    let position = match form.text("position") {
        Some(raw) => raw.parse::<NumberPosition>()?,
        None => NumberPosition::default(),
    };
    let start = match form.text("start") {
        Some(raw) => parse_start_number(raw)?,
        None => 1,
    };

    let input = upload.staged.path().to_path_buf();
    let overlay = scope.allocate(FileOrigin::Intermediate, "numbers", "pdf");
    let output = scope.allocate(FileOrigin::Output, "numbered", "pdf");
    let (overlay_path, out_path) = (overlay.path().to_path_buf(), output.path().to_path_buf());

    let pages = run_blocking(move || {
        apply_overlay(&input, &overlay_path, &out_path, StampTarget::AllPages, |boxes| {
            page_number_overlay(boxes, format, position, start)
        })
    })
    .await?;

    info!("🔢 Numbered {} pages of {}", pages, upload.file_name);
    file_response(scope, &output, PDF_MEDIA_TYPE, "numbered.pdf").await
}
