//! Application state.

use std::sync::Arc;

use vshield_detector::{DetectorFactory, DetectorRegistry, OnnxDetectorFactory};
use vshield_media::{FfmpegFrameSampler, FrameSampler};
use vshield_models::CatalogError;

use crate::config::ApiConfig;
use crate::services::AnalysisService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub registry: Arc<DetectorRegistry>,
    pub analysis: AnalysisService,
}

impl AppState {
    /// Create state with the ONNX detector backend and the FFmpeg sampler.
    pub fn new(config: ApiConfig) -> Result<Self, CatalogError> {
        let factory = Arc::new(OnnxDetectorFactory::new(config.detector_config()));
        let sampler = Arc::new(FfmpegFrameSampler::new().with_timeout(config.ffmpeg_timeout_secs));
        Self::with_components(config, factory, sampler)
    }

    /// Create state from explicit collaborators.
    pub fn with_components(
        config: ApiConfig,
        factory: Arc<dyn DetectorFactory>,
        sampler: Arc<dyn FrameSampler>,
    ) -> Result<Self, CatalogError> {
        let registry = Arc::new(DetectorRegistry::new(config.model_catalog()?, factory));
        let config = Arc::new(config);
        let analysis = AnalysisService::new(Arc::clone(&config), Arc::clone(&registry), sampler);

        Ok(Self {
            config,
            registry,
            analysis,
        })
    }
}
