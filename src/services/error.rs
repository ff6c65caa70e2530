use thiserror::Error;

/// Failure of a single conversion step.
///
/// Variants for which [`ConvertError::is_client_error`] is true describe bad input
/// (rejected before or by validation); everything else is a collaborator failure.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("{0}")]
    Invalid(String),

    #[error("PDF is encrypted and cannot be opened without a password")]
    Encrypted,

    #[error("PDF is not password protected")]
    NotEncrypted,

    #[error("Incorrect password")]
    WrongPassword,

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("Worker task failed: {0}")]
    Task(String),
}

impl ConvertError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ConvertError::Invalid(message.into())
    }

    pub fn tool(tool: &str, message: impl Into<String>) -> Self {
        ConvertError::Tool {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ConvertError::Invalid(_) | ConvertError::NotEncrypted | ConvertError::WrongPassword
        )
    }
}

impl From<quick_xml::events::attributes::AttrError> for ConvertError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        ConvertError::Xml(e.into())
    }
}

pub type ConvertResult<T> = Result<T, ConvertError>;

/// Runs a CPU-bound conversion on the blocking pool.
pub async fn run_blocking<T, F>(task: F) -> ConvertResult<T>
where
    F: FnOnce() -> ConvertResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ConvertError::Task(e.to_string()))?
}
