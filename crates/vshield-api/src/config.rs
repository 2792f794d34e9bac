//! API configuration.

use std::path::PathBuf;
use std::str::FromStr;

use vshield_detector::OnnxDetectorConfig;
use vshield_media::SamplingOptions;
use vshield_models::{CatalogError, ModelCatalog, DEFAULT_FAKE_THRESHOLD};

/// Default request body limit (2 GiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024 * 1024;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Directory uploads are written to
    pub upload_dir: PathBuf,
    /// Accepted video extensions, lowercase without the dot
    pub allowed_extensions: Vec<String>,
    /// Keep one frame out of every N decoded frames
    pub sample_every_n: usize,
    /// Upper bound on sampled frames per upload
    pub max_frames: usize,
    /// Known model names; the first one is the default
    pub model_names: Vec<String>,
    /// Directory holding `{model}.onnx` files
    pub models_dir: PathBuf,
    /// Verdict threshold on the mean frame score
    pub fake_threshold: f32,
    /// Construct every configured detector at startup
    pub preload_models: bool,
    /// Keep uploaded files after frames are sampled
    pub retain_uploads: bool,
    /// Kill FFmpeg if decoding an upload takes longer than this
    pub ffmpeg_timeout_secs: u64,
    /// Max request body size
    pub max_body_size: usize,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Expose Prometheus metrics at /metrics
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            upload_dir: PathBuf::from("uploads"),
            allowed_extensions: ["mp4", "mov", "avi", "mkv", "webm"]
                .into_iter()
                .map(String::from)
                .collect(),
            sample_every_n: 10,
            max_frames: 64,
            model_names: vec!["efficientnet_b4".to_string(), "xception".to_string()],
            models_dir: PathBuf::from("models"),
            fake_threshold: DEFAULT_FAKE_THRESHOLD,
            preload_models: false,
            retain_uploads: true,
            ffmpeg_timeout_secs: 600,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            cors_origins: vec!["*".to_string()],
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT", defaults.port),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            allowed_extensions: env_list("ALLOWED_EXTENSIONS")
                .map(|exts| {
                    exts.into_iter()
                        .map(|e| e.trim_start_matches('.').to_lowercase())
                        .collect()
                })
                .unwrap_or(defaults.allowed_extensions),
            sample_every_n: env_parse("SAMPLE_EVERY_N_FRAMES", defaults.sample_every_n),
            max_frames: env_parse("MAX_FRAMES", defaults.max_frames),
            model_names: env_list("MODEL_NAMES").unwrap_or(defaults.model_names),
            models_dir: std::env::var("MODELS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.models_dir),
            fake_threshold: env_parse("FAKE_THRESHOLD", defaults.fake_threshold),
            preload_models: env_bool("PRELOAD_MODELS", defaults.preload_models),
            retain_uploads: env_bool("RETAIN_UPLOADS", defaults.retain_uploads),
            ffmpeg_timeout_secs: env_parse("FFMPEG_TIMEOUT_SECS", defaults.ffmpeg_timeout_secs),
            max_body_size: env_parse("MAX_BODY_SIZE", defaults.max_body_size),
            cors_origins: env_list("CORS_ORIGINS").unwrap_or(defaults.cors_origins),
            metrics_enabled: env_bool("METRICS_ENABLED", defaults.metrics_enabled),
        }
    }

    /// Frame sampling parameters for uploads.
    pub fn sampling_options(&self) -> SamplingOptions {
        SamplingOptions::new(self.sample_every_n, self.max_frames)
    }

    /// Build the model catalog from the configured names.
    pub fn model_catalog(&self) -> Result<ModelCatalog, CatalogError> {
        ModelCatalog::new(&self.model_names)
    }

    /// Settings for the ONNX detector backend.
    pub fn detector_config(&self) -> OnnxDetectorConfig {
        OnnxDetectorConfig {
            models_dir: self.models_dir.clone(),
            threshold: self.fake_threshold,
            ..Default::default()
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

/// Comma-separated list; `None` when unset or blank.
fn env_list(key: &str) -> Option<Vec<String>> {
    let list: Vec<String> = std::env::var(key)
        .ok()?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    (!list.is_empty()).then_some(list)
}
