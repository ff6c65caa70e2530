pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::api::handlers::{annotate, convert, health, inspect, organize, protection, source};
use crate::config::AppConfig;
use crate::services::ocr::TextRecognizer;
use crate::services::raster::PageRenderer;
use crate::services::staging::StagingArea;
use axum::{
    Router,
    http::{HeaderValue, header},
    middleware::from_fn,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::root,
        health::health_check,
        organize::merge_pdfs,
        organize::split_pdf,
        organize::delete_pages,
        organize::compress_pdf,
        organize::rotate_pdf,
        convert::pdf_to_jpg,
        convert::pdf_to_png,
        convert::jpg_to_pdf,
        convert::png_to_pdf,
        convert::pdf_to_word,
        convert::word_to_pdf,
        convert::excel_to_pdf,
        convert::pdf_to_excel,
        annotate::watermark_pdf,
        annotate::sign_pdf,
        annotate::add_page_numbers,
        protection::protect_pdf,
        protection::unlock_pdf,
        source::java_to_pdf,
        source::python_to_pdf,
        source::cpp_to_pdf,
        source::xml_to_pdf,
        source::notebook_to_pdf,
        inspect::ocr,
        inspect::preview,
    ),
    components(
        schemas(
            api::handlers::ErrorResponse,
            api::handlers::FileUpload,
            api::handlers::PagesUpload,
            health::RootResponse,
            health::HealthResponse,
            organize::MergeUpload,
            organize::RotateUpload,
            convert::ImagesUpload,
            annotate::WatermarkUpload,
            annotate::SignUpload,
            annotate::PageNumbersUpload,
            protection::PasswordUpload,
            services::ocr::OcrReport,
            inspect::PagePreview,
            inspect::PreviewResponse,
        )
    ),
    tags(
        (name = "system", description = "Service status"),
        (name = "organize", description = "Merge, split, reorder and compress PDFs"),
        (name = "convert", description = "Conversions between PDF, images and Office documents"),
        (name = "annotate", description = "Watermarks, signatures and page numbers"),
        (name = "security", description = "Password protection"),
        (name = "source", description = "Source code and notebook listings"),
        (name = "inspect", description = "Text extraction and page previews")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub staging: StagingArea,
    pub datastore: Option<DatabaseConnection>,
    pub renderer: Arc<dyn PageRenderer>,
    pub recognizer: Arc<dyn TextRecognizer>,
}

pub fn create_app(state: AppState) -> Router {
    let routes = Router::new()
        .route("/api", get(health::root))
        .route("/api/", get(health::root))
        .route("/api/health", get(health::health_check))
        .route("/api/merge", post(organize::merge_pdfs))
        .route("/api/split", post(organize::split_pdf))
        .route("/api/delete-pages", post(organize::delete_pages))
        .route("/api/compress", post(organize::compress_pdf))
        .route("/api/rotate", post(organize::rotate_pdf))
        .route("/api/pdf-to-jpg", post(convert::pdf_to_jpg))
        .route("/api/pdf-to-png", post(convert::pdf_to_png))
        .route("/api/jpg-to-pdf", post(convert::jpg_to_pdf))
        .route("/api/png-to-pdf", post(convert::png_to_pdf))
        .route("/api/pdf-to-word", post(convert::pdf_to_word))
        .route("/api/word-to-pdf", post(convert::word_to_pdf))
        .route("/api/excel-to-pdf", post(convert::excel_to_pdf))
        .route("/api/pdf-to-excel", post(convert::pdf_to_excel))
        .route("/api/watermark", post(annotate::watermark_pdf))
        .route("/api/sign", post(annotate::sign_pdf))
        .route("/api/page-numbers", post(annotate::add_page_numbers))
        .route("/api/protect", post(protection::protect_pdf))
        .route("/api/unlock", post(protection::unlock_pdf))
        .route("/api/java-to-pdf", post(source::java_to_pdf))
        .route("/api/python-to-pdf", post(source::python_to_pdf))
        .route("/api/cpp-to-pdf", post(source::cpp_to_pdf))
        .route("/api/xml-to-pdf", post(source::xml_to_pdf))
        .route("/api/notebook-to-pdf", post(source::notebook_to_pdf))
        .route("/api/ocr", post(inspect::ocr))
        .route("/api/preview", post(inspect::preview));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(routes)
        .layer(from_fn(api::middleware::security::security_headers))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        // Multipart framing on top of the file itself
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.max_file_size + 1024 * 1024,
        ))
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            header::CONTENT_DISPOSITION,
            header::HeaderName::from_static("x-request-id"),
        ]);

    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}
