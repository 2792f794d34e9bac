//! Detector traits.
//!
//! These traits are the seam between request handling and model inference,
//! so handlers can be exercised with substitute detectors.

use std::sync::Arc;

use vshield_media::Frame;
use vshield_models::{Aggregate, ModelId, DEFAULT_FAKE_THRESHOLD};

use crate::error::DetectorResult;

/// A loaded, ready-to-use detection model.
///
/// Implementations are shared across requests and must be safe to call
/// concurrently. Calls are CPU bound and may block.
pub trait Detector: Send + Sync {
    /// Model this detector was built for.
    fn model(&self) -> &ModelId;

    /// Score each frame with the probability that it is manipulated.
    ///
    /// # Returns
    /// One score in `[0, 1]` per frame, in frame order.
    fn predict_frames(&self, frames: &[Frame]) -> DetectorResult<Vec<f32>>;

    /// Score at or above which a frame counts as manipulated.
    fn threshold(&self) -> f32 {
        DEFAULT_FAKE_THRESHOLD
    }

    /// Summarize per-frame scores.
    fn aggregate(&self, scores: &[f32]) -> Aggregate {
        Aggregate::from_scores(scores, self.threshold())
    }
}

/// Builds detectors. Construction is expensive (weight loading) and blocking.
pub trait DetectorFactory: Send + Sync {
    fn create(&self, model: &ModelId) -> DetectorResult<Arc<dyn Detector>>;
}

impl<F> DetectorFactory for F
where
    F: Fn(&ModelId) -> DetectorResult<Arc<dyn Detector>> + Send + Sync,
{
    fn create(&self, model: &ModelId) -> DetectorResult<Arc<dyn Detector>> {
        self(model)
    }
}
