//! Analysis result models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ModelId;

/// Maximum number of thumbnail previews returned per analysis.
pub const MAX_THUMBNAILS: usize = 6;

/// Default score at or above which a frame counts as manipulated.
pub const DEFAULT_FAKE_THRESHOLD: f32 = 0.5;

/// Overall verdict for an analyzed video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    #[default]
    Real,
    Fake,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Real => "real",
            Verdict::Fake => "fake",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Summary of per-frame scores.
///
/// Scores are probabilities in `[0, 1]` that a frame is manipulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Aggregate {
    /// Mean frame score; drives the verdict
    pub mean_score: f32,
    pub max_score: f32,
    pub min_score: f32,
    pub median_score: f32,
    /// Fraction of frames scoring at or above the threshold
    pub fake_frame_ratio: f32,
    pub threshold: f32,
    pub verdict: Verdict,
}

impl Aggregate {
    /// Summarize a score sequence against a threshold.
    ///
    /// An empty sequence yields all-zero statistics and a `real` verdict.
    pub fn from_scores(scores: &[f32], threshold: f32) -> Self {
        if scores.is_empty() {
            return Self {
                mean_score: 0.0,
                max_score: 0.0,
                min_score: 0.0,
                median_score: 0.0,
                fake_frame_ratio: 0.0,
                threshold,
                verdict: Verdict::Real,
            };
        }

        let count = scores.len() as f32;
        let mean_score = scores.iter().sum::<f32>() / count;
        let max_score = scores.iter().copied().fold(f32::MIN, f32::max);
        let min_score = scores.iter().copied().fold(f32::MAX, f32::min);

        let mut sorted = scores.to_vec();
        sorted.sort_by(f32::total_cmp);
        let mid = sorted.len() / 2;
        let median_score = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        let fake_frames = scores.iter().filter(|s| **s >= threshold).count();

        Self {
            mean_score,
            max_score,
            min_score,
            median_score,
            fake_frame_ratio: fake_frames as f32 / count,
            threshold,
            verdict: if mean_score >= threshold {
                Verdict::Fake
            } else {
                Verdict::Real
            },
        }
    }
}

/// Embeddable preview of a sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Thumbnail {
    /// Frame position in the sampled sequence
    pub index: usize,
    /// Base64-encoded JPEG
    pub img_b64: String,
    /// Score for this frame, `None` when the detector returned fewer scores than frames
    pub score: Option<f32>,
}

/// Response payload for a completed analysis.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AnalysisResult {
    /// Sanitized original filename
    pub filename: String,
    pub model_used: ModelId,
    pub num_frames: usize,
    pub frame_scores: Vec<f32>,
    pub aggregate: Aggregate,
    pub thumbnails: Vec<Thumbnail>,
}
