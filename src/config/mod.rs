use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the workbench service
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root directory holding `img/`, `DOC/`, `PDF/` and `RedactPDF/` (default: current dir)
    pub data_dir: PathBuf,

    /// Listening port (default: 5000)
    pub port: u16,

    /// Maximum request body size in bytes (default: 16 MB)
    pub max_request_size: usize,

    /// Delay before a downloaded artifact is removed (default: 60 s)
    pub download_ttl: Duration,

    /// Viewer used by `/api/open`: "system", "noop" or an explicit command (default: "system")
    pub viewer: String,

    /// ffmpeg binary used to decode HEIC/HEIF uploads (default: "ffmpeg")
    pub ffmpeg_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            port: 5000,
            max_request_size: 16 * 1024 * 1024, // 16 MB
            download_ttl: Duration::from_secs(60),
            viewer: "system".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            data_dir: env::var("PDF_WORKBENCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.data_dir),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            max_request_size: env::var("MAX_REQUEST_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_request_size),

            download_ttl: env::var("DOWNLOAD_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.download_ttl),

            viewer: env::var("PDF_VIEWER").unwrap_or(default.viewer),

            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(default.ffmpeg_path),
        }
    }

    /// Config rooted at `data_dir` with no external viewer, for local runs and tests
    pub fn development(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            viewer: "noop".to_string(),
            ..Self::default()
        }
    }

    pub fn with_download_ttl(mut self, ttl: Duration) -> Self {
        self.download_ttl = ttl;
        self
    }
}
