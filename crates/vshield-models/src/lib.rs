//! Shared data models for VShield.
//!
//! This crate provides Serde-serializable types for:
//! - Model identifiers and the configured model catalog
//! - Per-frame scores and aggregate verdicts
//! - Analysis responses and thumbnail previews

pub mod analysis;
pub mod model;

// Re-export common types
pub use analysis::{Aggregate, AnalysisResult, Thumbnail, Verdict, DEFAULT_FAKE_THRESHOLD, MAX_THUMBNAILS};
pub use model::{CatalogError, ModelCatalog, ModelId, UnknownModelError};
