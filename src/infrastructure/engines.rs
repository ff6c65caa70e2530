use crate::config::AppConfig;
use crate::services::ocr::{TextRecognizer, create_recognizer};
use crate::services::raster::{PageRenderer, create_renderer};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn setup_renderer(config: &AppConfig) -> Arc<dyn PageRenderer> {
    let renderer = create_renderer(&config.render_engine, &config.pdftocairo_path);

    if renderer.health_check().await {
        info!("🖼️  Page renderer ready ({}, {} dpi)", renderer.name(), config.render_dpi);
    } else {
        warn!(
            "⚠️  Page renderer '{}' unavailable! PDF to image, preview and OCR of scanned pages will fail.",
            renderer.name()
        );
    }

    renderer
}

pub async fn setup_recognizer(config: &AppConfig) -> Arc<dyn TextRecognizer> {
    let recognizer = create_recognizer(
        &config.ocr_engine,
        &config.tesseract_path,
        &config.ocr_language,
    );

    // Warm up the engine
    if recognizer.is_enabled() {
        if recognizer.health_check().await {
            info!("🔍 OCR engine ready ({})", recognizer.name());
        } else {
            warn!(
                "⚠️  OCR engine '{}' unreachable! Scanned pages will fail to recognize.",
                recognizer.name()
            );
        }
    }

    recognizer
}
