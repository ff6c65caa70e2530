mod common;

use axum::http::StatusCode;
use common::*;

#[tokio::test]
async fn test_watermark_with_text() {
    let app = TestApp::new();

    let form = MultipartForm::new()
        .pdf("file", "doc.pdf", &numbered_pdf(2))
        .text("text", "CONFIDENTIAL")
        .text("position", "bottom-right")
        .text("opacity", "0.5");
    let response = app.post("/api/watermark", form).await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc = load_pdf(&body_bytes(response).await);
    assert_eq!(page_count(&doc), 2);
    assert_eq!(app.staged_files(), 0);
}

#[tokio::test]
async fn test_watermark_with_image() {
    let app = TestApp::new();

    let form = MultipartForm::new()
        .pdf("file", "doc.pdf", &numbered_pdf(1))
        .file("image", "logo.png", "image/png", &png_bytes(16, 16));
    let response = app.post("/api/watermark", form).await;
    assert_eq!(response.status(), StatusCode::OK);
    load_pdf(&body_bytes(response).await);
    assert_eq!(app.staged_files(), 0);
}

#[tokio::test]
async fn test_watermark_requires_text_or_image() {
    let app = TestApp::new();

    let form = MultipartForm::new()
        .pdf("file", "doc.pdf", &numbered_pdf(1))
        .text("text", "   ");
    let response = app.post("/api/watermark", form).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_watermark_rejects_bad_opacity() {
    let app = TestApp::new();

    let form = MultipartForm::new()
        .pdf("file", "doc.pdf", &numbered_pdf(1))
        .text("text", "DRAFT")
        .text("opacity", "1.5");
    let response = app.post("/api/watermark", form).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sign_keeps_page_count() {
    let app = TestApp::new();

    let form = MultipartForm::new()
        .pdf("file", "contract.pdf", &numbered_pdf(3))
        .text("signature_text", "Jane Q. Public");
    let response = app.post("/api/sign", form).await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc = load_pdf(&body_bytes(response).await);
    assert_eq!(page_count(&doc), 3);
    assert_eq!(app.staged_files(), 0);
}

#[tokio::test]
async fn test_sign_requires_signature_text() {
    let app = TestApp::new();

    let form = MultipartForm::new().pdf("file", "contract.pdf", &numbered_pdf(1));
    let response = app.post("/api/sign", form).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert!(json["detail"].as_str().unwrap().contains("signature_text"));
}

#[tokio::test]
async fn test_page_numbers() {
    let app = TestApp::new();

    let form = MultipartForm::new()
        .pdf("file", "doc.pdf", &numbered_pdf(3))
        .text("format", "roman-upper-page")
        .text("position", "bottom-center")
        .text("start", "2");
    let response = app.post("/api/page-numbers", form).await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc = load_pdf(&body_bytes(response).await);
    assert_eq!(page_count(&doc), 3);
    assert_eq!(app.staged_files(), 0);
}

#[tokio::test]
async fn test_page_numbers_rejects_unknown_format() {
    let app = TestApp::new();

    let form = MultipartForm::new()
        .pdf("file", "doc.pdf", &numbered_pdf(1))
        .text("format", "hex");
    let response = app.post("/api/page-numbers", form).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_page_numbers_rejects_zero_start() {
    let app = TestApp::new();

    let form = MultipartForm::new()
        .pdf("file", "doc.pdf", &numbered_pdf(1))
        .text("start", "0");
    let response = app.post("/api/page-numbers", form).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_page_numbers_rejects_start_beyond_limit() {
    let app = TestApp::new();

    for start in ["1000001", "4294967295"] {
        let form = MultipartForm::new()
            .pdf("file", "doc.pdf", &numbered_pdf(2))
            .text("start", start);
        let response = app.post("/api/page-numbers", form).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains("Invalid start number"));
    }
    assert_eq!(app.staged_files(), 0);
}

#[tokio::test]
async fn test_page_numbers_at_start_limit() {
    let app = TestApp::new();

    let form = MultipartForm::new()
        .pdf("file", "doc.pdf", &numbered_pdf(2))
        .text("start", "1000000");
    let response = app.post("/api/page-numbers", form).await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc = load_pdf(&body_bytes(response).await);
    assert_eq!(page_count(&doc), 2);
}
