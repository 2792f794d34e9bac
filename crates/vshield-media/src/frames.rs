//! Frame sampling.
//!
//! Frames are decoded by FFmpeg straight into packed RGB24 on stdout, so no
//! intermediate files are written. Sampling keeps every `every_n`-th decoded
//! frame (starting with the first) until `max_frames` have been collected,
//! and resizes each kept frame to a fixed size.

use std::path::Path;

use async_trait::async_trait;
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// A decoded RGB frame.
pub type Frame = RgbImage;

/// Resize target applied to sampled frames.
pub const DEFAULT_RESIZE: (u32, u32) = (256, 256);

/// Frame sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingOptions {
    /// Keep one frame out of every `every_n` decoded frames
    pub every_n: usize,
    /// Upper bound on the number of frames returned
    pub max_frames: usize,
    /// Output frame size (width, height)
    pub resize: (u32, u32),
}

impl SamplingOptions {
    pub fn new(every_n: usize, max_frames: usize) -> Self {
        Self {
            every_n,
            max_frames,
            resize: DEFAULT_RESIZE,
        }
    }

    pub fn with_resize(mut self, width: u32, height: u32) -> Self {
        self.resize = (width, height);
        self
    }

    /// Reject options that would make FFmpeg misbehave.
    pub fn validate(&self) -> MediaResult<()> {
        if self.every_n == 0 {
            return Err(MediaError::InvalidOptions("every_n must be at least 1".into()));
        }
        if self.max_frames == 0 {
            return Err(MediaError::InvalidOptions("max_frames must be at least 1".into()));
        }
        if self.resize.0 == 0 || self.resize.1 == 0 {
            return Err(MediaError::InvalidOptions("resize dimensions must be non-zero".into()));
        }
        Ok(())
    }

    /// Size in bytes of one RGB24 output frame.
    pub fn frame_bytes(&self) -> usize {
        self.resize.0 as usize * self.resize.1 as usize * 3
    }
}

/// Source of decoded frames for a video file.
#[async_trait]
pub trait FrameSampler: Send + Sync {
    /// Sample frames from a video.
    ///
    /// # Returns
    /// Frames in decode order. Empty when nothing could be decoded.
    async fn sample_frames(
        &self,
        video_path: &Path,
        options: &SamplingOptions,
    ) -> MediaResult<Vec<Frame>>;

    /// Sampler name for logging.
    fn name(&self) -> &'static str;
}

/// FFmpeg-backed frame sampler.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameSampler {
    runner: FfmpegRunner,
}

impl FfmpegFrameSampler {
    pub fn new() -> Self {
        Self {
            runner: FfmpegRunner::new(),
        }
    }

    /// Kill FFmpeg if decoding takes longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }

    fn build_command(video_path: &Path, options: &SamplingOptions) -> FfmpegCommand {
        let (width, height) = options.resize;
        let scale = format!("scale={}:{}", width, height);
        let filter = if options.every_n > 1 {
            format!("select=not(mod(n\\,{})),{}", options.every_n, scale)
        } else {
            scale
        };

        FfmpegCommand::piped(video_path)
            .video_filter(filter)
            .variable_frame_rate()
            .max_frames(options.max_frames)
            .pixel_format("rgb24")
            .output_format("rawvideo")
    }
}

#[async_trait]
impl FrameSampler for FfmpegFrameSampler {
    async fn sample_frames(
        &self,
        video_path: &Path,
        options: &SamplingOptions,
    ) -> MediaResult<Vec<Frame>> {
        options.validate()?;

        if !video_path.exists() {
            return Err(MediaError::FileNotFound(video_path.to_path_buf()));
        }

        let cmd = Self::build_command(video_path, options);
        let output = self.runner.output(&cmd).await?;

        // Undecodable input yields whatever was decoded before the failure,
        // usually nothing; the caller decides what an empty sequence means.
        if !output.status.success() {
            warn!(
                path = %video_path.display(),
                exit_code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "FFmpeg could not fully decode video"
            );
        }

        let frames = split_frames(&output.stdout, options)?;

        info!(
            path = %video_path.display(),
            frames = frames.len(),
            every_n = options.every_n,
            max_frames = options.max_frames,
            "Sampled frames"
        );

        Ok(frames)
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Split a packed RGB24 buffer into frames, dropping any trailing partial frame.
fn split_frames(buffer: &[u8], options: &SamplingOptions) -> MediaResult<Vec<Frame>> {
    let (width, height) = options.resize;
    let frame_bytes = options.frame_bytes();

    let remainder = buffer.len() % frame_bytes;
    if remainder != 0 {
        debug!("Dropping {} trailing bytes of a partial frame", remainder);
    }

    buffer
        .chunks_exact(frame_bytes)
        .take(options.max_frames)
        .map(|chunk| {
            RgbImage::from_raw(width, height, chunk.to_vec())
                .ok_or_else(|| MediaError::internal("Failed to create image buffer"))
        })
        .collect()
}
