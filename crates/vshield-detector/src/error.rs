//! Error types for detection.

use std::path::PathBuf;
use thiserror::Error;

use vshield_models::UnknownModelError;

/// Result type for detection operations.
pub type DetectorResult<T> = Result<T, DetectorError>;

/// Errors that can occur while loading or running a detector.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error(transparent)]
    UnknownModel(#[from] UnknownModelError),

    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Failed to load model '{model}': {message}")]
    LoadFailed { model: String, message: String },

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DetectorError {
    /// Create a model load failure error.
    pub fn load_failed(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LoadFailed {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create an inference failure error.
    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::InferenceFailed(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
