//! Thumbnail encoding.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::codecs::jpeg::JpegEncoder;

use crate::error::MediaResult;
use crate::frames::Frame;

/// JPEG quality used for inline previews.
pub const THUMBNAIL_JPEG_QUALITY: u8 = 85;

/// Encode a frame as a base64 JPEG suitable for a `data:image/jpeg;base64,` URL.
pub fn frame_to_base64(frame: &Frame) -> MediaResult<String> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, THUMBNAIL_JPEG_QUALITY).encode_image(frame)?;
    Ok(STANDARD.encode(jpeg))
}
