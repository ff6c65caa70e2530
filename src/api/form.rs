//! Multipart form parsing with every file field staged to disk.

use crate::api::error::AppError;
use crate::services::error::ConvertError;
use crate::services::staging::{RequestScope, StagedFile};
use crate::utils::validation::{InputKind, require_kind, sanitize_filename, verify_signature};
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use futures::TryStreamExt;
use std::collections::HashMap;
use std::io::ErrorKind;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

/// Bytes read from a staged upload for signature sniffing.
const SIGNATURE_SNIFF_LEN: u64 = 8 * 1024;

/// An uploaded file field, already on disk.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    /// Sanitized client filename, for messages and derived output names.
    pub file_name: String,
    pub staged: StagedFile,
}

impl UploadedFile {
    /// Checks the claimed extension, then the leading bytes of the staged file.
    pub async fn check(&self, kind: InputKind) -> Result<(), AppError> {
        require_kind(&self.file_name, kind)?;

        let file = tokio::fs::File::open(self.staged.path()).await?;
        let mut header = Vec::new();
        file.take(SIGNATURE_SNIFF_LEN).read_to_end(&mut header).await?;
        verify_signature(&header, &self.file_name, kind)?;
        Ok(())
    }
}

/// Body errors hit while a file is being copied to disk.
fn multipart_io_error(e: MultipartError) -> std::io::Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        std::io::Error::new(ErrorKind::FileTooLarge, e.body_text())
    } else {
        std::io::Error::new(ErrorKind::InvalidData, e.body_text())
    }
}

/// The parsed form: staged files in arrival order plus plain text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    files: Vec<UploadedFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Reads the whole multipart body. File fields are streamed into `scope`.
    pub async fn read(multipart: &mut Multipart, scope: &mut RequestScope) -> Result<Self, AppError> {
        let result = Self::read_fields(multipart, scope).await;

        if let Err(e) = &result {
            // Drain the body so the client sees the error instead of a reset connection
            tracing::warn!("Upload rejected early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
        }
        result
    }

    async fn read_fields(multipart: &mut Multipart, scope: &mut RequestScope) -> Result<Self, AppError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                // Browsers send an empty file part when nothing was selected
                Some(original) if original.trim().is_empty() => {
                    let mut field = field;
                    while field.chunk().await?.is_some() {}
                }
                Some(original) => {
                    let file_name = sanitize_filename(&original);
                    let body_with_io_error = field.map_err(multipart_io_error);
                    let reader = StreamReader::new(body_with_io_error);

                    let staged = scope.stage_upload(&file_name, reader).await.map_err(|e| match e {
                        ConvertError::Io(io) if io.kind() == ErrorKind::FileTooLarge => {
                            AppError::PayloadTooLarge(
                                "Request body exceeds the maximum allowed limit".to_string(),
                            )
                        }
                        ConvertError::Io(io) if io.kind() == ErrorKind::InvalidData => {
                            AppError::BadRequest(io.to_string())
                        }
                        other => AppError::from(other),
                    })?;
                    form.files.push(UploadedFile {
                        field: name,
                        file_name,
                        staged,
                    });
                }
                None => {
                    let text = field.text().await?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    /// The `file` field, or the first uploaded file when the client named it differently.
    pub fn file(&self) -> Result<&UploadedFile, AppError> {
        self.files
            .iter()
            .find(|f| f.field == "file")
            .or_else(|| self.files.first())
            .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))
    }

    pub fn named_file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == name)
    }

    /// Every file uploaded under `name`, in upload order.
    pub fn files(&self, name: &str) -> Vec<&UploadedFile> {
        self.files.iter().filter(|f| f.field == name).collect()
    }

    pub fn all_files(&self) -> &[UploadedFile] {
        &self.files
    }

    /// A text field; blank values count as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// The raw text field, untrimmed (passwords).
    pub fn raw_text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn required_text(&self, name: &str) -> Result<&str, AppError> {
        self.text(name)
            .ok_or_else(|| AppError::BadRequest(format!("Missing required field '{}'", name)))
    }
}
