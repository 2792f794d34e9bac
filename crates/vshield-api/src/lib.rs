//! Axum HTTP API server.
//!
//! This crate provides:
//! - `POST /analyze`: upload a video, get per-frame deepfake scores and a verdict
//! - Model listing, liveness and readiness probes
//! - Security headers, CORS and request body limits
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{AnalyzeError, ApiError, ApiResult};
pub use routes::create_router;
pub use services::{AnalysisService, ReceivedUpload};
pub use state::AppState;
