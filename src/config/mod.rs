use std::env;
use std::path::PathBuf;

/// Runtime configuration for the conversion service
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listen host (default: "0.0.0.0")
    pub host: String,

    /// Listen port (default: 8001)
    pub port: u16,

    /// Shared staging directory for request files
    pub upload_dir: PathBuf,

    /// Maximum request body size in bytes (default: 100 MB)
    pub max_file_size: usize,

    /// Allowed CORS origins; `*` allows any origin
    pub cors_origins: Vec<String>,

    /// Optional datastore, only reported by the health endpoint
    pub database_url: Option<String>,

    /// Resolution for PDF to image conversion (default: 144)
    pub render_dpi: u32,

    /// Resolution for preview thumbnails (default: 48)
    pub preview_dpi: u32,

    /// Maximum number of pages in a preview (default: 50)
    pub preview_max_pages: usize,

    /// Page renderer: "pdftocairo" or "none" (default: "pdftocairo")
    pub render_engine: String,

    /// OCR engine: "tesseract" or "noop" (default: "tesseract")
    pub ocr_engine: String,

    /// Tesseract language (default: "eng")
    pub ocr_language: String,

    pub tesseract_path: String,

    pub pdftocairo_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            upload_dir: env::temp_dir().join("pdf-master-uploads"),
            max_file_size: 100 * 1024 * 1024, // 100 MB
            cors_origins: vec!["*".to_string()],
            database_url: None,
            render_dpi: 144,
            preview_dpi: 48,
            preview_max_pages: 50,
            render_engine: "pdftocairo".to_string(),
            ocr_engine: "tesseract".to_string(),
            ocr_language: "eng".to_string(),
            tesseract_path: "tesseract".to_string(),
            pdftocairo_path: "pdftocairo".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            host: env::var("HOST").unwrap_or(default.host),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or(default.cors_origins),

            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),

            render_dpi: env::var("RENDER_DPI")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&dpi| dpi > 0)
                .unwrap_or(default.render_dpi),

            preview_dpi: env::var("PREVIEW_DPI")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&dpi| dpi > 0)
                .unwrap_or(default.preview_dpi),

            preview_max_pages: env::var("PREVIEW_MAX_PAGES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.preview_max_pages),

            render_engine: env::var("RENDER_ENGINE")
                .map(|v| v.to_lowercase())
                .unwrap_or(default.render_engine),

            ocr_engine: env::var("OCR_ENGINE")
                .map(|v| v.to_lowercase())
                .unwrap_or(default.ocr_engine),

            ocr_language: env::var("OCR_LANGUAGE").unwrap_or(default.ocr_language),

            tesseract_path: env::var("TESSERACT_PATH").unwrap_or(default.tesseract_path),

            pdftocairo_path: env::var("PDFTOCAIRO_PATH").unwrap_or(default.pdftocairo_path),
        }
    }

    /// Create config for development (no external engines, small previews)
    pub fn development() -> Self {
        Self {
            render_engine: "none".to_string(),
            ocr_engine: "noop".to_string(),
            preview_max_pages: 10,
            ..Self::default()
        }
    }

    /// Whether any origin may call the API.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if origins.is_empty() {
        vec!["*".to_string()]
    } else {
        origins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8001);
        assert_eq!(config.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.render_dpi, 144);
        assert_eq!(config.ocr_engine, "tesseract");
        assert!(config.allows_any_origin());
        assert!(config.database_url.is_none());
        assert!(config.upload_dir.ends_with("pdf-master-uploads"));
    }

    #[test]
    fn test_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.render_engine, "none");
        assert_eq!(config.ocr_engine, "noop");
        assert_eq!(config.preview_max_pages, 10);
        assert_eq!(config.bind_address(), "0.0.0.0:8001");
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("http://localhost:3000/, https://pdf.example.com"),
            vec!["http://localhost:3000", "https://pdf.example.com"]
        );
        assert_eq!(parse_origins(" , "), vec!["*"]);
    }
}
