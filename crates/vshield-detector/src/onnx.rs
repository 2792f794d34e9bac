//! Deepfake classification using exported ONNX models.
//!
//! Each configured model is a binary classifier stored as
//! `{models_dir}/{model}.onnx`, taking a `[1, 3, S, S]` normalized RGB
//! tensor and producing either a single logit or a two-class logit pair
//! (`[real, fake]`).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::imageops::{self, FilterType};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use vshield_media::Frame;
use vshield_models::{ModelId, DEFAULT_FAKE_THRESHOLD};

use crate::detector::{Detector, DetectorFactory};
use crate::error::{DetectorError, DetectorResult};

/// Configuration shared by all ONNX detectors.
#[derive(Debug, Clone)]
pub struct OnnxDetectorConfig {
    /// Directory holding `{model}.onnx` files
    pub models_dir: PathBuf,
    /// Square input size expected by the models
    pub input_size: u32,
    /// Name of the logits output tensor
    pub output_name: String,
    /// Per-channel normalization mean (RGB)
    pub mean: [f32; 3],
    /// Per-channel normalization standard deviation (RGB)
    pub std: [f32; 3],
    /// Verdict threshold on the mean frame score
    pub threshold: f32,
}

impl Default for OnnxDetectorConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            input_size: 224,
            output_name: "output".to_string(),
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            threshold: DEFAULT_FAKE_THRESHOLD,
        }
    }
}

impl OnnxDetectorConfig {
    /// Path of the ONNX file for a model.
    pub fn model_path(&self, model: &ModelId) -> PathBuf {
        self.models_dir.join(format!("{}.onnx", model.as_str()))
    }
}

/// Detector backed by an ONNX Runtime session.
pub struct OnnxDetector {
    model: ModelId,
    session: Mutex<Session>,
    config: OnnxDetectorConfig,
}

impl OnnxDetector {
    /// Load the model file for `model`.
    ///
    /// Returns error if the model file doesn't exist or cannot be loaded.
    pub fn load(model: &ModelId, config: &OnnxDetectorConfig) -> DetectorResult<Self> {
        let model_path = config.model_path(model);
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path));
        }

        let session = create_session(model, &model_path)?;
        info!(
            model = %model,
            model_path = %model_path.display(),
            input_size = config.input_size,
            "ONNX detector initialized"
        );

        Ok(Self {
            model: model.clone(),
            session: Mutex::new(session),
            config: config.clone(),
        })
    }

    fn score_frame(&self, frame: &Frame) -> DetectorResult<f32> {
        let size = self.config.input_size as usize;
        let data = frame_to_chw(frame, &self.config);

        let input = Tensor::from_array((vec![1usize, 3, size, size], data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| DetectorError::inference_failed(format!("Failed to create tensor: {}", e)))?;

        let logits = self.run_inference(input)?;
        score_from_logits(&logits)
    }

    fn run_inference(&self, input: Value) -> DetectorResult<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectorError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| DetectorError::inference_failed(format!("ONNX inference failed: {}", e)))?;

        let output = outputs.get(self.config.output_name.as_str()).ok_or_else(|| {
            DetectorError::inference_failed(format!(
                "Missing {} tensor",
                self.config.output_name
            ))
        })?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::inference_failed(format!("Failed to extract tensor: {}", e)))?;

        Ok(tensor.1.to_vec())
    }
}

impl Detector for OnnxDetector {
    fn model(&self) -> &ModelId {
        &self.model
    }

    fn predict_frames(&self, frames: &[Frame]) -> DetectorResult<Vec<f32>> {
        let scores = frames
            .iter()
            .map(|frame| self.score_frame(frame))
            .collect::<DetectorResult<Vec<_>>>()?;

        debug!(model = %self.model, frames = scores.len(), "Scored frames");
        Ok(scores)
    }

    fn threshold(&self) -> f32 {
        self.config.threshold
    }
}

/// Builds [`OnnxDetector`]s from a shared configuration.
#[derive(Debug, Clone, Default)]
pub struct OnnxDetectorFactory {
    config: OnnxDetectorConfig,
}

impl OnnxDetectorFactory {
    pub fn new(config: OnnxDetectorConfig) -> Self {
        Self { config }
    }
}

impl DetectorFactory for OnnxDetectorFactory {
    fn create(&self, model: &ModelId) -> DetectorResult<Arc<dyn Detector>> {
        Ok(Arc::new(OnnxDetector::load(model, &self.config)?))
    }
}

/// Resize a frame to the model input and lay it out as normalized CHW floats.
fn frame_to_chw(frame: &Frame, config: &OnnxDetectorConfig) -> Vec<f32> {
    let size = config.input_size;
    let resized = if frame.dimensions() == (size, size) {
        frame.clone()
    } else {
        imageops::resize(frame, size, size, FilterType::Triangle)
    };

    let (w, h) = (size as usize, size as usize);
    let mut chw = Vec::with_capacity(3 * h * w);

    for c in 0..3 {
        for y in 0..h {
            for x in 0..w {
                let pixel = resized.get_pixel(x as u32, y as u32);
                let value = pixel[c] as f32 / 255.0;
                chw.push((value - config.mean[c]) / config.std[c]);
            }
        }
    }

    chw
}

/// Convert classifier logits to a fake probability.
///
/// A single logit goes through a sigmoid; a `[real, fake]` pair goes through
/// a softmax and the fake probability is returned.
pub fn score_from_logits(logits: &[f32]) -> DetectorResult<f32> {
    match logits {
        [logit] => Ok(1.0 / (1.0 + (-logit).exp())),
        [real, fake] => {
            let max = real.max(*fake);
            let real = (real - max).exp();
            let fake = (fake - max).exp();
            Ok(fake / (real + fake))
        }
        other => Err(DetectorError::inference_failed(format!(
            "Expected 1 or 2 logits per frame, got {}",
            other.len()
        ))),
    }
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model: &ModelId, model_path: &Path) -> DetectorResult<Session> {
    let builder = Session::builder()
        .map_err(load_err(model))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(load_err(model))?;

    // Try CUDA on Linux with cuda feature
    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_file(model_path) {
                info!(model = %model, "Using CUDA execution provider");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, using CPU");
    }

    builder.commit_from_file(model_path).map_err(load_err(model))
}

fn load_err<E: std::fmt::Display>(model: &ModelId) -> impl Fn(E) -> DetectorError + '_ {
    move |e| DetectorError::load_failed(model.as_str(), e.to_string())
}
