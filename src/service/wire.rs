/// JSON bodies exchanged with the inference service.

use crate::postprocess::detection::{Detection, ImageSize};
use serde::{Deserialize, Serialize};

/// `GET /api/model-status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default)]
    pub using_mock_models: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub support_classes: Vec<String>,
}

impl ModelStatus {
    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }

    /// Detections from this service do not come from a production model.
    pub fn is_mock(&self) -> bool {
        self.using_mock_models || self.model_type.as_deref() == Some("emergency_fallback")
    }
}

/// One entry of `predictions` in a `POST /api/predict` response, in model-input space.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WirePrediction {
    pub boxes: [f64; 4],
    pub label: String,
    pub score: f64,
}

impl From<WirePrediction> for Detection {
    fn from(p: WirePrediction) -> Self {
        Detection::new(p.boxes, p.label, p.score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WireImageSize {
    pub width: f64,
    pub height: f64,
}

/// `POST /api/predict` success body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub predictions: Vec<WirePrediction>,
    #[serde(default)]
    pub clean_image: String,
    #[serde(default)]
    pub annotated_image: String,
    #[serde(default)]
    pub image_size: Option<WireImageSize>,
    #[serde(default)]
    pub message: Option<String>,
}

impl PredictResponse {
    pub fn image_size_or(&self, input_size: u32) -> ImageSize {
        self.image_size
            .map(|s| ImageSize {
                width: s.width,
                height: s.height,
            })
            .unwrap_or_else(|| ImageSize::square(input_size))
    }
}
