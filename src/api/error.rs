use crate::services::error::ConvertError;
use crate::utils::validation::ValidationError;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Conversion(_) | AppError::Internal(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ConvertError> for AppError {
    fn from(e: ConvertError) -> Self {
        if e.is_client_error() {
            return AppError::BadRequest(e.to_string());
        }
        match e {
            ConvertError::Io(io) => AppError::Io(io),
            ConvertError::Task(msg) => AppError::Internal(msg),
            other => AppError::Conversion(other.to_string()),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::BadRequest(e.message)
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        let message = e.body_text();
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE || message.contains("length limit exceeded") {
            AppError::PayloadTooLarge(message)
        } else {
            AppError::BadRequest(message)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::BadRequest(msg) | AppError::PayloadTooLarge(msg) => msg,
            AppError::Conversion(msg) => {
                tracing::error!("Conversion error: {}", msg);
                msg
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {:?}", e);
                "Internal Server Error".to_string()
            }
        };

        let body = Json(json!({
            "detail": message
        }));

        (status, body).into_response()
    }
}
