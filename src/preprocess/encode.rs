/// Canvas serialization: JPEG for transport, PNG for annotated output, `data:` URLs for the caller.

use crate::error::AppError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;

pub const JPEG_MIME: &str = "image/jpeg";
pub const PNG_MIME: &str = "image/png";

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|e| AppError::Encode(format!("JPEG: {e}")))?;
    Ok(buf)
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, AppError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| AppError::Encode(format!("PNG: {e}")))?;
    Ok(buf.into_inner())
}

pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// Split a base64 `data:` URL into its MIME type and raw bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>), AppError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| AppError::InvalidResponse("not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AppError::InvalidResponse("data URL has no payload".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| AppError::InvalidResponse("data URL is not base64".to_string()))?;
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| AppError::InvalidResponse(format!("data URL payload: {e}")))?;
    Ok((mime.to_string(), bytes))
}

/// File extension for a MIME type produced by the service or the fallback renderer.
pub fn extension_for(mime: &str) -> &'static str {
    match mime {
        PNG_MIME => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}
