/// Image decoding via the `image` crate (JPEG, PNG, WebP, BMP).

use crate::error::AppError;
use image::RgbImage;

pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// RGB pixel data, row-major, 3 bytes per pixel
    pub data: Vec<u8>,
}

impl DecodedImage {
    pub fn from_rgb(image: RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.into_raw(),
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// Decode image bytes into RGB pixel data.
pub fn decode_image(data: &[u8]) -> Result<DecodedImage, AppError> {
    if data.is_empty() {
        return Err(AppError::ImageDecode("empty image payload".to_string()));
    }

    let img = image::load_from_memory(data).map_err(|e| AppError::ImageDecode(format!("{e}")))?;
    let rgb = img.to_rgb8();

    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(AppError::ImageDecode(format!(
            "image has zero dimension ({}x{})",
            rgb.width(),
            rgb.height()
        )));
    }

    Ok(DecodedImage::from_rgb(rgb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_fail_with_decode_error() {
        let err = decode_image(b"definitely not an image").err();
        assert!(matches!(err, Some(AppError::ImageDecode(_))));
        assert!(matches!(decode_image(&[]), Err(AppError::ImageDecode(_))));
    }

    #[test]
    fn png_round_trips_dimensions() {
        let img = RgbImage::from_pixel(7, 3, image::Rgb([10, 20, 30]));
        let bytes = crate::preprocess::encode::encode_png(&img).unwrap();
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!((decoded.width, decoded.height), (7, 3));
        assert_eq!(&decoded.data[..3], &[10, 20, 30]);
    }
}
