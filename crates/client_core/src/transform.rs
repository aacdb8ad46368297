//! Square thumbnail transform applied to every upload.

use image::{codecs::jpeg::JpegEncoder, GenericImageView};
use shared::error::GridError;
use tracing::warn;

/// Fixed re-encode quality for cropped uploads.
pub const JPEG_QUALITY: u8 = 92;

#[derive(Debug, Clone)]
pub struct TransformedImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Center-crop `bytes` to a square and re-encode as JPEG.
///
/// The crop side is `min(width, height)`; non-square sources are never
/// letterboxed or stretched. An undecodable input fails with
/// [`GridError::ImageDecode`] so the caller leaves the slot untouched. A
/// failure in the re-encode step falls back to the original, unprocessed
/// bytes rather than losing the upload.
pub fn square_crop_jpeg(bytes: &[u8]) -> Result<TransformedImage, GridError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|err| GridError::ImageDecode(err.to_string()))?;
    let (width, height) = decoded.dimensions();
    let size = width.min(height);
    let cropped = decoded
        .crop_imm((width - size) / 2, (height - size) / 2, size, size)
        .to_rgb8();

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    match encoder.encode_image(&cropped) {
        Ok(()) => Ok(TransformedImage {
            bytes: out,
            content_type: "image/jpeg",
            width: size,
            height: size,
        }),
        Err(err) => {
            warn!("square crop re-encode failed, uploading original image: {err}");
            Ok(TransformedImage {
                bytes: bytes.to_vec(),
                content_type: sniff_content_type(bytes),
                width,
                height,
            })
        }
    }
}

/// Best-effort content type from magic bytes, for the re-encode fallback.
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else {
        "application/octet-stream"
    }
}

/// File extension recorded in stored object names.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        _ => "bin",
    }
}
