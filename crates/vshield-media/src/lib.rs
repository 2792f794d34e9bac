//! Media helpers for the analysis pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Frame sampling through FFmpeg's rawvideo output
//! - Base64 JPEG encoding of frames for embeddable previews
//! - Upload filename sanitization and extension checks

pub mod command;
pub mod error;
pub mod frames;
pub mod thumbnail;
pub mod upload;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::{FfmpegFrameSampler, Frame, FrameSampler, SamplingOptions, DEFAULT_RESIZE};
pub use thumbnail::frame_to_base64;
pub use upload::{allowed_file, file_extension, secure_filename, UploadRecord};
