/// Detection values shared by served and synthetic predictions.
///
/// A box carries no record of which coordinate space it is in; callers track the transform stage.

use serde::{Deserialize, Serialize};

pub type BBox = [f64; 4];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// `[x1, y1, x2, y2]`
    #[serde(rename = "box")]
    pub bbox: BBox,
    #[serde(rename = "class")]
    pub class_label: String,
    pub score: f64,
}

impl Detection {
    pub fn new(bbox: BBox, class_label: impl Into<String>, score: f64) -> Self {
        Self {
            bbox,
            class_label: class_label.into(),
            score,
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.bbox[0] < self.bbox[2] && self.bbox[1] < self.bbox[3]
    }

    pub fn width(&self) -> f64 {
        self.bbox[2] - self.bbox[0]
    }

    pub fn height(&self) -> f64 {
        self.bbox[3] - self.bbox[1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: f64,
    pub height: f64,
}

impl ImageSize {
    pub fn square(size: u32) -> Self {
        Self {
            width: size as f64,
            height: size as f64,
        }
    }
}

/// The unit handed back to the caller, served or synthesized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub predictions: Vec<Detection>,
    /// Encoded clean image (a `data:` URL).
    pub clean_image: String,
    /// Encoded image with boxes drawn (a `data:` URL).
    pub annotated_image: String,
    /// Model input size for raw-space results, the requested display size otherwise.
    pub image_size: ImageSize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
