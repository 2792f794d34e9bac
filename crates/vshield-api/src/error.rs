//! API error types.

use std::error::Error as StdError;

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use vshield_detector::DetectorError;
use vshield_media::MediaError;
use vshield_models::UnknownModelError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Why an analysis request failed.
///
/// Every variant is terminal for the request. Status codes are assigned by
/// [`ApiError`], not here.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("no file part")]
    MissingFile,

    #[error("no selected file")]
    NoSelectedFile,

    #[error("allowed extensions: [{}]", .allowed.join(", "))]
    DisallowedExtension { allowed: Vec<String> },

    #[error("no frames extracted")]
    NoFramesExtracted,

    #[error(transparent)]
    UnknownModel(#[from] UnknownModelError),

    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Failed to store upload: {0}")]
    Upload(#[from] std::io::Error),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Detector(DetectorError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalyzeError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyzeError::MissingFile | AnalyzeError::NoSelectedFile => "missing_file",
            AnalyzeError::DisallowedExtension { .. } => "disallowed_extension",
            AnalyzeError::NoFramesExtracted => "no_frames_extracted",
            AnalyzeError::UnknownModel(_) => "unknown_model",
            AnalyzeError::Multipart(_) => "invalid_multipart",
            AnalyzeError::Upload(_) => "upload_failed",
            AnalyzeError::Media(_) => "media_failed",
            AnalyzeError::Detector(_) => "detector_failed",
            AnalyzeError::Internal(_) => "internal",
        }
    }
}

impl From<DetectorError> for AnalyzeError {
    fn from(err: DetectorError) -> Self {
        match err {
            DetectorError::UnknownModel(e) => AnalyzeError::UnknownModel(e),
            other => AnalyzeError::Detector(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Analyze(#[from] AnalyzeError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Analyze(err) => match err {
                AnalyzeError::MissingFile
                | AnalyzeError::NoSelectedFile
                | AnalyzeError::DisallowedExtension { .. }
                | AnalyzeError::NoFramesExtracted => StatusCode::BAD_REQUEST,
                AnalyzeError::Multipart(e) => e.status(),
                AnalyzeError::UnknownModel(_)
                | AnalyzeError::Upload(_)
                | AnalyzeError::Media(_)
                | AnalyzeError::Detector(_)
                | AnalyzeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(status = %status, error = %error_chain(&self), "Request failed");
        } else {
            warn!(status = %status, error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Render an error and all of its sources as `outer: inner: ...`.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        // Transparent wrappers repeat their inner message.
        if !chain.ends_with(&cause_text) {
            chain.push_str(": ");
            chain.push_str(&cause_text);
        }
        source = cause.source();
    }
    chain
}
