//! Streaming a staged output back to the client.

use crate::api::error::AppError;
use crate::services::staging::{RequestScope, StagedFile};
use axum::{
    body::Body,
    http::{StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use futures::Stream;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;

/// File body that owns the request's staging scope.
///
/// The scope is dropped together with the stream, which happens once the last
/// chunk has been sent or the client went away.
pub struct ScopedStream {
    inner: ReaderStream<tokio::fs::File>,
    _scope: RequestScope,
}

impl ScopedStream {
    pub fn new(file: tokio::fs::File, scope: RequestScope) -> Self {
        Self {
            inner: ReaderStream::new(file),
            _scope: scope,
        }
    }
}

impl Stream for ScopedStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// Responds with `output` as an attachment, handing `scope` to the body.
pub async fn file_response(
    scope: RequestScope,
    output: &StagedFile,
    media_type: &str,
    download_name: &str,
) -> Result<Response, AppError> {
    let file = tokio::fs::File::open(output.path()).await?;
    let length = file.metadata().await?.len();

    tracing::debug!(
        "📤 Streaming {} ({} bytes) as {}",
        output.path().display(),
        length,
        download_name
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, media_type)
        .header(header::CONTENT_LENGTH, length)
        .header(header::CONTENT_DISPOSITION, content_disposition(download_name))
        .body(Body::from_stream(ScopedStream::new(file, scope)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

/// `attachment` disposition with an ASCII fallback and the RFC 5987 UTF-8 name.
pub fn content_disposition(filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();
    let fallback_filename = if ascii_filename.trim().is_empty() {
        "file"
    } else {
        &ascii_filename
    };

    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::staging::{FileOrigin, StagingArea};
    use http_body_util::BodyExt;

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("merged.pdf"),
            "attachment; filename=\"merged.pdf\"; filename*=UTF-8''merged%2Epdf"
        );

        let header = content_disposition("résumé \"final\".pdf");
        assert!(header.starts_with("attachment; filename=\"rsum final.pdf\""));
        assert!(header.contains("filename*=UTF-8''r%C3%A9sum%C3%A9%20%22final%22%2Epdf"));

        assert!(content_disposition("测试.pdf").starts_with("attachment; filename=\".pdf\""));
        assert!(content_disposition("测试").starts_with("attachment; filename=\"file\""));
    }

    #[tokio::test]
    async fn test_scope_released_after_body_is_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path());
        let mut scope = area.scope();
        let output = scope.allocate(FileOrigin::Output, "out", "pdf");
        std::fs::write(output.path(), b"%PDF-1.5 body").unwrap();

        let response = file_response(scope, &output, "application/pdf", "out.pdf")
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "13");
        assert!(output.path().exists());

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"%PDF-1.5 body");
        assert!(!output.path().exists());
    }

    #[tokio::test]
    async fn test_scope_released_when_response_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path());
        let mut scope = area.scope();
        let output = scope.allocate(FileOrigin::Output, "out", "pdf");
        std::fs::write(output.path(), b"partial").unwrap();

        let response = file_response(scope, &output, "application/pdf", "out.pdf")
            .await
            .unwrap();
        drop(response);
        assert!(!output.path().exists());
    }
}
