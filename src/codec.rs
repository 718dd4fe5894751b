//! Frame transcoding
//!
//! Raw camera bytes in, transport-ready payload out: decode, resize to
//! the target resolution with a Lanczos filter when needed, re-encode as
//! JPEG at the configured quality, base64-wrap for the text protocol.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::config::Resolution;
use crate::error::Result;
use crate::protocol::FramePayload;

/// Transcode one raw frame into a transport-ready payload
pub fn encode_frame(raw: &[u8], target: Resolution, quality: u8) -> Result<FramePayload> {
    let decoded = image::load_from_memory(raw)?;

    let resized = if decoded.width() != target.width || decoded.height() != target.height {
        decoded.resize_exact(target.width, target.height, FilterType::Lanczos3)
    } else {
        decoded
    };

    // JPEG carries no alpha channel; quality 0 is rejected by the encoder
    let rgb = resized.to_rgb8();
    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    encoder.encode_image(&rgb)?;

    Ok(FramePayload {
        data: BASE64.encode(&jpeg),
        width: target.width,
        height: target.height,
    })
}
