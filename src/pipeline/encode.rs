//! Binary-to-text encoding for request bodies, and JPEG encoding of camera stills.
//!
//! Recognition services accept documents as bare base64 embedded in JSON.
//! Browsers and canvases hand out `data:<mime>;base64,<payload>` URLs instead;
//! the header is stripped here so only the payload travels.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// JPEG quality for camera stills.
pub const STILL_JPEG_QUALITY: u8 = 90;

/// Base64-encode raw document bytes.
pub fn encode_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 payload back into bytes.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(payload.trim())
}

/// Split `data:<mime>;base64,<payload>` into `(mime, payload)`.
///
/// Returns `None` for anything that is not a base64 data URL.
pub fn split_data_url(data_url: &str) -> Option<(&str, &str)> {
    let rest = data_url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    Some((mime, payload))
}

/// Encode a live frame as a JPEG still.
///
/// The frame is flattened to RGB first; JPEG has no alpha channel.
pub fn encode_still(frame: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let rgb = frame.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, STILL_JPEG_QUALITY);
    encoder.encode_image(&rgb)?;
    debug!(
        "Encoded {}x{} still → {} bytes JPEG",
        rgb.width(),
        rgb.height(),
        buf.len()
    );
    Ok(buf)
}
