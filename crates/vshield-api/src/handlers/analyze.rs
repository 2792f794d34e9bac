//! Video analysis handler.

use std::time::Instant;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use tracing::debug;

use vshield_models::AnalysisResult;

use crate::error::{AnalyzeError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Analyze an uploaded video.
///
/// Multipart fields: `file` (required) and `model_name` (optional, defaults
/// to the first configured model).
pub async fn analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<AnalysisResult>> {
    let start = Instant::now();

    // A body that is not multipart has no file part.
    let mut multipart = multipart.map_err(|rejection| {
        debug!(error = %rejection, "Request body is not multipart");
        AnalyzeError::MissingFile
    })?;

    let upload = match state.analysis.receive_upload(&mut multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            metrics::record_analysis("none", e.kind(), start.elapsed().as_secs_f64());
            return Err(e.into());
        }
    };
    metrics::record_upload_bytes(upload.size_bytes);

    // Unresolvable names share one label.
    let model = state
        .analysis
        .resolve_model(upload.model_name.as_deref())
        .map(|id| id.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let result = state.analysis.analyze(upload).await;

    let outcome = match &result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    metrics::record_analysis(&model, outcome, start.elapsed().as_secs_f64());

    Ok(Json(result?))
}
