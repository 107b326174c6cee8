/// Letterbox preprocessing for the fixed square model input.
///
/// 1. aspect = w / h
/// 2. landscape (aspect > 1): target_w = size, target_h = size / aspect, offset_y = (size - target_h) / 2
/// 3. portrait/square: target_h = size, target_w = size * aspect, offset_x = (size - target_w) / 2
/// 4. Bilinear resize to the rounded target, paste onto a black `size x size` canvas
/// 5. Encode the canvas as JPEG for transport
///
/// Metadata keeps the exact fractional geometry; only the rendered pixels are rounded.

use super::decode::{decode_image, DecodedImage};
use super::encode::encode_jpeg;
use crate::error::AppError;
use image::RgbImage;
use serde::Serialize;
use tracing::debug;

/// Geometry of an image of one aspect ratio centered inside a box of another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub scaled_width: f64,
    pub scaled_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Fit a `src_w x src_h` image inside a `box_w x box_h` box, preserving aspect ratio and centering
/// along the padded axis.
///
/// For a square box this is exactly the model-input letterbox; the display transform reuses it with
/// the rendered element size.
pub fn compute_placement(src_w: f64, src_h: f64, box_w: f64, box_h: f64) -> Placement {
    let src_aspect = src_w / src_h;
    let box_aspect = box_w / box_h;

    if src_aspect > box_aspect {
        let scaled_height = box_w / src_aspect;
        Placement {
            scaled_width: box_w,
            scaled_height,
            offset_x: 0.0,
            offset_y: (box_h - scaled_height) / 2.0,
        }
    } else {
        let scaled_width = box_h * src_aspect;
        Placement {
            scaled_width,
            scaled_height: box_h,
            offset_x: (box_w - scaled_width) / 2.0,
            offset_y: 0.0,
        }
    }
}

/// Everything needed to invert the letterbox later. Produced once per prediction, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterboxMetadata {
    pub original_width: u32,
    pub original_height: u32,
    /// Width of the scaled original inside the square canvas.
    pub target_width: f64,
    /// Height of the scaled original inside the square canvas.
    pub target_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub input_size: u32,
}

impl LetterboxMetadata {
    pub fn compute(original_width: u32, original_height: u32, input_size: u32) -> Self {
        let size = input_size as f64;
        let placement = compute_placement(original_width as f64, original_height as f64, size, size);

        Self {
            original_width,
            original_height,
            target_width: placement.scaled_width,
            target_height: placement.scaled_height,
            offset_x: placement.offset_x,
            offset_y: placement.offset_y,
            input_size,
        }
    }

    /// Metadata for a canvas that already is the model input (no padding, no scaling).
    pub fn identity(input_size: u32) -> Self {
        Self::compute(input_size, input_size, input_size)
    }
}

/// Output of `preprocess`: the transport payload plus the canvas it was encoded from.
pub struct PreprocessedImage {
    /// JPEG bytes of the `input_size x input_size` canvas.
    pub payload: Vec<u8>,
    pub canvas: RgbImage,
    pub meta: LetterboxMetadata,
}

/// Decode, letterbox and encode an image for the model.
pub fn preprocess(data: &[u8], input_size: u32, jpeg_quality: u8) -> Result<PreprocessedImage, AppError> {
    let img = decode_image(data)?;
    let (canvas, meta) = letterbox(&img, input_size)?;
    let payload = encode_jpeg(&canvas, jpeg_quality)?;

    debug!(
        original = format!("{}x{}", meta.original_width, meta.original_height),
        target = format!("{:.2}x{:.2}", meta.target_width, meta.target_height),
        offset = format!("({:.2}, {:.2})", meta.offset_x, meta.offset_y),
        payload_bytes = payload.len(),
        "Letterboxed image for model"
    );

    Ok(PreprocessedImage { payload, canvas, meta })
}

/// Render `img` onto a black square canvas of `input_size` at the letterbox placement.
pub fn letterbox(img: &DecodedImage, input_size: u32) -> Result<(RgbImage, LetterboxMetadata), AppError> {
    if input_size == 0 {
        return Err(AppError::Config("model input size must be positive".to_string()));
    }

    let meta = LetterboxMetadata::compute(img.width, img.height, input_size);

    // Pixel footprint of the scaled image; clamped so rounding never spills past the canvas
    let new_w = (meta.target_width.round() as u32).clamp(1, input_size);
    let new_h = (meta.target_height.round() as u32).clamp(1, input_size);
    let left = (meta.offset_x.round() as u32).min(input_size - new_w);
    let top = (meta.offset_y.round() as u32).min(input_size - new_h);

    let resized = if new_w != img.width || new_h != img.height {
        resize_bilinear(&img.data, img.width, img.height, new_w, new_h)?
    } else {
        img.data.clone()
    };

    let size = input_size as usize;
    let mut padded = vec![0u8; size * size * 3];

    for y in 0..new_h as usize {
        let src_offset = y * new_w as usize * 3;
        let dst_offset = ((y + top as usize) * size + left as usize) * 3;
        let row_bytes = new_w as usize * 3;
        padded[dst_offset..dst_offset + row_bytes]
            .copy_from_slice(&resized[src_offset..src_offset + row_bytes]);
    }

    let canvas = RgbImage::from_raw(input_size, input_size, padded)
        .ok_or_else(|| AppError::Encode("canvas buffer size mismatch".to_string()))?;

    Ok((canvas, meta))
}

/// Bilinear resize for RGB images.
fn resize_bilinear(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Result<Vec<u8>, AppError> {
    use fast_image_resize as fr;

    let src_image = fr::images::Image::from_vec_u8(src_w, src_h, src.to_vec(), fr::PixelType::U8x3)
        .map_err(|e| AppError::Encode(format!("resize source: {e}")))?;

    let mut dst_image = fr::images::Image::new(dst_w, dst_h, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src_image,
            &mut dst_image,
            &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Interpolation(fr::FilterType::Bilinear)),
        )
        .map_err(|e| AppError::Encode(format!("resize: {e}")))?;

    Ok(dst_image.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn solid(width: u32, height: u32) -> DecodedImage {
        DecodedImage::from_rgb(RgbImage::from_pixel(width, height, image::Rgb([200, 200, 200])))
    }

    #[test]
    fn landscape_1600x900_pads_vertically() {
        let meta = LetterboxMetadata::compute(1600, 900, 512);
        assert_abs_diff_eq!(meta.target_width, 512.0);
        assert_abs_diff_eq!(meta.target_height, 288.0, epsilon = 1e-9);
        assert_abs_diff_eq!(meta.offset_x, 0.0);
        assert_abs_diff_eq!(meta.offset_y, 112.0, epsilon = 1e-9);
    }

    #[test]
    fn portrait_pads_horizontally() {
        let meta = LetterboxMetadata::compute(600, 1200, 512);
        assert_abs_diff_eq!(meta.target_height, 512.0);
        assert_abs_diff_eq!(meta.target_width, 256.0, epsilon = 1e-9);
        assert_abs_diff_eq!(meta.offset_x, 128.0, epsilon = 1e-9);
        assert_abs_diff_eq!(meta.offset_y, 0.0);
    }

    #[test]
    fn square_fills_the_canvas() {
        let meta = LetterboxMetadata::compute(1024, 1024, 512);
        assert_abs_diff_eq!(meta.target_width, 512.0);
        assert_abs_diff_eq!(meta.target_height, 512.0);
        assert_abs_diff_eq!(meta.offset_x, 0.0);
        assert_abs_diff_eq!(meta.offset_y, 0.0);
    }

    #[test]
    fn placement_invariants_hold_across_aspect_ratios() {
        let sizes = [(1, 1), (3, 1), (1, 3), (1920, 1080), (1080, 1920), (513, 511), (37, 2000), (4000, 3)];
        for (w, h) in sizes {
            let meta = LetterboxMetadata::compute(w, h, 512);
            let r = w as f64 / h as f64;
            let larger = meta.target_width.max(meta.target_height);
            let smaller = meta.target_width.min(meta.target_height);

            assert_abs_diff_eq!(larger, 512.0, epsilon = 1e-9);
            assert_abs_diff_eq!(smaller, 512.0 / r.max(1.0 / r), epsilon = 1e-9);
            assert_abs_diff_eq!(meta.target_width / meta.target_height, r, epsilon = 1e-9);
            assert_abs_diff_eq!(meta.offset_x, (512.0 - meta.target_width) / 2.0, epsilon = 1e-9);
            assert_abs_diff_eq!(meta.offset_y, (512.0 - meta.target_height) / 2.0, epsilon = 1e-9);
            assert!(meta.offset_x == 0.0 || meta.offset_y == 0.0);
        }
    }

    #[test]
    fn non_square_box_centres_on_the_padded_axis() {
        // 4:3 image in a 16:9 box fills the height
        let p = compute_placement(800.0, 600.0, 1600.0, 900.0);
        assert_abs_diff_eq!(p.scaled_height, 900.0);
        assert_abs_diff_eq!(p.scaled_width, 1200.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.offset_x, 200.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.offset_y, 0.0);
    }

    #[test]
    fn canvas_is_black_outside_the_image() {
        let (canvas, meta) = letterbox(&solid(160, 90), 64).unwrap();
        assert_eq!(canvas.dimensions(), (64, 64));
        assert_abs_diff_eq!(meta.offset_y, 14.0, epsilon = 1e-9);

        assert_eq!(canvas.get_pixel(32, 2).0, [0, 0, 0]);
        assert_eq!(canvas.get_pixel(32, 61).0, [0, 0, 0]);
        assert_eq!(canvas.get_pixel(32, 32).0, [200, 200, 200]);
    }

    #[test]
    fn zero_input_size_is_a_config_error() {
        let err = letterbox(&solid(16, 9), 0).unwrap_err();
        assert!(matches!(err, AppError::Config(_)), "{err:?}");
    }

    #[test]
    fn preprocess_produces_square_jpeg() {
        let src = RgbImage::from_pixel(90, 160, image::Rgb([255, 255, 255]));
        let bytes = crate::preprocess::encode::encode_png(&src).unwrap();

        let out = preprocess(&bytes, 128, 90).unwrap();
        assert_eq!(out.canvas.dimensions(), (128, 128));
        assert_eq!(out.meta.original_width, 90);
        assert_eq!(&out.payload[..2], &[0xFF, 0xD8]);

        let decoded = decode_image(&out.payload).unwrap();
        assert_eq!((decoded.width, decoded.height), (128, 128));
    }

    #[test]
    fn preprocess_rejects_undecodable_input() {
        assert!(matches!(preprocess(b"nope", 512, 90), Err(AppError::ImageDecode(_))));
    }
}
