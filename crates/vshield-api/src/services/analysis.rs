//! Upload analysis: receive, sample, score, summarize.

use std::path::Path;
use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::Multipart;
use axum::http::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use vshield_detector::DetectorRegistry;
use vshield_media::{allowed_file, frame_to_base64, Frame, FrameSampler, MediaResult, UploadRecord};
use vshield_models::{AnalysisResult, ModelId, Thumbnail, MAX_THUMBNAILS};

use crate::config::ApiConfig;
use crate::error::AnalyzeError;
use crate::metrics;

/// Multipart field carrying the video.
const FILE_FIELD: &str = "file";
/// Optional multipart field selecting the model.
const MODEL_FIELD: &str = "model_name";

/// A validated upload stored on disk.
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub record: UploadRecord,
    /// Requested model, `None` for the default
    pub model_name: Option<String>,
    pub size_bytes: u64,
}

/// Non-file multipart values collected while storing the upload.
#[derive(Debug, Default)]
struct UploadFields {
    /// Requested model, `None` when absent or blank
    model_name: Option<String>,
    size_bytes: u64,
}

/// Runs the analysis pipeline for one upload at a time.
#[derive(Clone)]
pub struct AnalysisService {
    config: Arc<ApiConfig>,
    registry: Arc<DetectorRegistry>,
    sampler: Arc<dyn FrameSampler>,
}

impl AnalysisService {
    pub fn new(
        config: Arc<ApiConfig>,
        registry: Arc<DetectorRegistry>,
        sampler: Arc<dyn FrameSampler>,
    ) -> Self {
        Self {
            config,
            registry,
            sampler,
        }
    }

    /// Read the multipart body, validate the file and store it.
    ///
    /// The filename and extension are checked before anything is written. An
    /// upload that fails after being written is removed.
    pub async fn receive_upload(
        &self,
        multipart: &mut Multipart,
    ) -> Result<ReceivedUpload, AnalyzeError> {
        let mut stored: Option<UploadRecord> = None;

        let fields = match self.read_fields(multipart, &mut stored).await {
            Ok(fields) => fields,
            Err(e) => {
                if let Some(record) = &stored {
                    discard_upload(&record.path).await;
                }
                return Err(reject_malformed_body(e));
            }
        };

        let record = stored.ok_or(AnalyzeError::MissingFile)?;
        let UploadFields {
            model_name,
            size_bytes,
        } = fields;

        info!(
            filename = %record.filename,
            path = %record.path.display(),
            size_bytes,
            model = model_name.as_deref().unwrap_or("default"),
            "Upload received"
        );

        Ok(ReceivedUpload {
            record,
            model_name,
            size_bytes,
        })
    }

    /// Walk the multipart fields, storing the first `file` field.
    ///
    /// A `file` field without a filename is plain form data, not an upload.
    ///
    /// `stored` is set as soon as a file starts being written, so the caller
    /// can remove a partial upload when reading fails.
    async fn read_fields(
        &self,
        multipart: &mut Multipart,
        stored: &mut Option<UploadRecord>,
    ) -> Result<UploadFields, AnalyzeError> {
        let mut fields = UploadFields::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);

            match name.as_deref() {
                Some(FILE_FIELD) if stored.is_none() && field.file_name().is_some() => {
                    let record = self.validate_file_field(&field)?;
                    let path = record.path.clone();
                    *stored = Some(record);
                    fields.size_bytes = persist_field(field, &path).await?;
                }
                Some(MODEL_FIELD) => {
                    let value = field.text().await?;
                    let value = value.trim();
                    fields.model_name = (!value.is_empty()).then(|| value.to_string());
                }
                other => {
                    debug!(field = ?other, "Ignoring multipart field");
                }
            }
        }

        Ok(fields)
    }

    fn validate_file_field(&self, field: &Field<'_>) -> Result<UploadRecord, AnalyzeError> {
        let original = match field.file_name() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(AnalyzeError::NoSelectedFile),
        };

        if !allowed_file(original, &self.config.allowed_extensions) {
            return Err(AnalyzeError::DisallowedExtension {
                allowed: self.config.allowed_extensions.clone(),
            });
        }

        Ok(UploadRecord::new(&self.config.upload_dir, original))
    }

    /// Resolve a requested model name, falling back to the default model.
    pub fn resolve_model(&self, model_name: Option<&str>) -> Result<ModelId, AnalyzeError> {
        Ok(self.registry.catalog().resolve_or_default(model_name)?)
    }

    /// Sample frames from a stored upload, score them and assemble the result.
    ///
    /// The model name is resolved only once frames exist, and always before
    /// the registry is consulted.
    pub async fn analyze(&self, upload: ReceivedUpload) -> Result<AnalysisResult, AnalyzeError> {
        let ReceivedUpload {
            record, model_name, ..
        } = upload;
        let options = self.config.sampling_options();
        debug!(sampler = self.sampler.name(), path = %record.path.display(), "Sampling frames");

        let sampled = self.sampler.sample_frames(&record.path, &options).await;
        if !self.config.retain_uploads {
            discard_upload(&record.path).await;
        }
        let frames = sampled?;

        metrics::record_frames_sampled(frames.len());
        if frames.is_empty() {
            return Err(AnalyzeError::NoFramesExtracted);
        }

        let model = self.resolve_model(model_name.as_deref())?;
        let detector = self.registry.get(&model).await?;
        let num_frames = frames.len();

        let (frame_scores, aggregate, thumbnails) = tokio::task::spawn_blocking(move || {
            let scores = detector.predict_frames(&frames)?;
            let aggregate = detector.aggregate(&scores);
            let thumbnails = build_thumbnails(&frames, &scores)?;
            Ok::<_, AnalyzeError>((scores, aggregate, thumbnails))
        })
        .await
        .map_err(|e| AnalyzeError::internal(format!("Inference task failed: {}", e)))??;

        info!(
            filename = %record.filename,
            model = %model,
            frames = num_frames,
            mean_score = aggregate.mean_score,
            verdict = %aggregate.verdict,
            "Analysis complete"
        );

        Ok(AnalysisResult {
            filename: record.filename,
            model_used: model,
            num_frames,
            frame_scores,
            aggregate,
            thumbnails,
        })
    }
}

/// Stream a multipart field into a new file, returning the bytes written.
async fn persist_field(mut field: Field<'_>, path: &Path) -> Result<u64, AnalyzeError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}

/// A body that cannot be parsed has no usable file part. Oversized bodies keep
/// their own error.
fn reject_malformed_body(err: AnalyzeError) -> AnalyzeError {
    match err {
        AnalyzeError::Multipart(e) if e.status() != StatusCode::PAYLOAD_TOO_LARGE => {
            debug!(error = %e, "Malformed multipart body");
            AnalyzeError::MissingFile
        }
        other => other,
    }
}

async fn discard_upload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed upload"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove upload"),
    }
}

/// Encode the leading frames as previews, each paired with its score if one exists.
fn build_thumbnails(frames: &[Frame], scores: &[f32]) -> MediaResult<Vec<Thumbnail>> {
    if frames.len() != scores.len() {
        warn!(
            frames = frames.len(),
            scores = scores.len(),
            "Detector returned a score count different from the frame count"
        );
    }

    frames
        .iter()
        .take(MAX_THUMBNAILS)
        .enumerate()
        .map(|(index, frame)| {
            Ok(Thumbnail {
                index,
                img_b64: frame_to_base64(frame)?,
                score: scores.get(index).copied(),
            })
        })
        .collect()
}
