pub mod detection;
pub mod transform;

pub use detection::{Detection, ImageSize, PredictionResult};
pub use transform::{
    display_to_model, model_to_display, model_to_original, model_to_original_pixels, scale_to_original,
    transform_detections, DisplayContext,
};
