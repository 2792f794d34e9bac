//! Deepfake detection.
//!
//! This crate provides:
//! - The [`Detector`] and [`DetectorFactory`] seams used by the API
//! - [`DetectorRegistry`], a lazily populated cache holding at most one
//!   detector per configured model
//! - An ONNX Runtime backed detector for exported classification models

pub mod detector;
pub mod error;
pub mod onnx;
pub mod registry;

pub use detector::{Detector, DetectorFactory};
pub use error::{DetectorError, DetectorResult};
pub use onnx::{OnnxDetector, OnnxDetectorConfig, OnnxDetectorFactory};
pub use registry::DetectorRegistry;
