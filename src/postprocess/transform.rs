/// Detection coordinate transformation between model-input, original-image and display space.
///
/// The model only ever sees the padded square, so every box it returns is in that space. Reaching
/// another space means removing the model padding first, then re-deriving how the same original image
/// is centered in the destination box. The display placement is recomputed on every call because the
/// rendered size changes between renders.

use super::detection::{BBox, Detection};
use crate::preprocess::letterbox::{compute_placement, LetterboxMetadata, Placement};
use serde::{Deserialize, Serialize};

/// Rendered size of the image element at the moment a transform is requested.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayContext {
    pub display_width: f64,
    pub display_height: f64,
}

impl DisplayContext {
    pub fn new(display_width: f64, display_height: f64) -> Self {
        Self {
            display_width,
            display_height,
        }
    }

    /// Parse `WIDTHxHEIGHT`, e.g. `800x450`.
    pub fn parse(value: &str) -> Option<Self> {
        let (w, h) = value.trim().split_once(['x', 'X'])?;
        let width: f64 = w.trim().parse().ok()?;
        let height: f64 = h.trim().parse().ok()?;
        (width > 0.0 && height > 0.0).then(|| Self::new(width, height))
    }

    fn placement(&self, meta: &LetterboxMetadata) -> Placement {
        compute_placement(
            meta.original_width as f64,
            meta.original_height as f64,
            self.display_width,
            self.display_height,
        )
    }
}

/// Remove the letterbox padding offset. No rescale: the result is in scaled-original units
/// (`target_width x target_height`), see `scale_to_original`.
pub fn model_to_original(bbox: BBox, meta: &LetterboxMetadata) -> BBox {
    [
        bbox[0] - meta.offset_x,
        bbox[1] - meta.offset_y,
        bbox[2] - meta.offset_x,
        bbox[3] - meta.offset_y,
    ]
}

/// Rescale an unpadded box from the `target_width x target_height` region to original pixels.
pub fn scale_to_original(bbox: BBox, meta: &LetterboxMetadata) -> BBox {
    let sx = meta.original_width as f64 / meta.target_width;
    let sy = meta.original_height as f64 / meta.target_height;
    [bbox[0] * sx, bbox[1] * sy, bbox[2] * sx, bbox[3] * sy]
}

/// Model-input space straight to true original-image pixels.
pub fn model_to_original_pixels(bbox: BBox, meta: &LetterboxMetadata) -> BBox {
    scale_to_original(model_to_original(bbox, meta), meta)
}

/// Model-input space to display space in a single fused step.
///
/// Do not combine with `scale_to_original`: the scale here already goes from the model's scaled
/// region to the display's scaled region.
pub fn model_to_display(bbox: BBox, meta: &LetterboxMetadata, display: &DisplayContext) -> BBox {
    let adjusted = model_to_original(bbox, meta);
    let placement = display.placement(meta);

    let scale_x = placement.scaled_width / meta.target_width;
    let scale_y = placement.scaled_height / meta.target_height;

    [
        adjusted[0] * scale_x + placement.offset_x,
        adjusted[1] * scale_y + placement.offset_y,
        adjusted[2] * scale_x + placement.offset_x,
        adjusted[3] * scale_y + placement.offset_y,
    ]
}

/// Inverse of `model_to_display` for the same metadata and display size.
pub fn display_to_model(bbox: BBox, meta: &LetterboxMetadata, display: &DisplayContext) -> BBox {
    let placement = display.placement(meta);

    let scale_x = meta.target_width / placement.scaled_width;
    let scale_y = meta.target_height / placement.scaled_height;

    [
        (bbox[0] - placement.offset_x) * scale_x + meta.offset_x,
        (bbox[1] - placement.offset_y) * scale_y + meta.offset_y,
        (bbox[2] - placement.offset_x) * scale_x + meta.offset_x,
        (bbox[3] - placement.offset_y) * scale_y + meta.offset_y,
    ]
}

/// Map model-space detections into display space. Without a display they stay in model space untouched.
pub fn transform_detections(
    detections: Vec<Detection>,
    meta: &LetterboxMetadata,
    display: Option<&DisplayContext>,
) -> Vec<Detection> {
    let Some(display) = display else {
        return detections;
    };

    detections
        .into_iter()
        .map(|det| Detection {
            bbox: model_to_display(det.bbox, meta, display),
            ..det
        })
        .collect()
}
