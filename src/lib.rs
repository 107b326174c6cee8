/// Client core for a remote chest X-ray detection service.
///
/// - `preprocess`: letterbox arbitrary images into the fixed square model input
/// - `postprocess`: map boxes between model-input, original-image and display space
/// - `service`: single-flight, cancellable requests with retry while the model warms up
/// - `fallback`: synthetic detections with the same contract when the backend is missing
/// - `palette`: class-to-color table

pub mod config;
pub mod error;
pub mod fallback;
pub mod palette;
pub mod postprocess;
pub mod preprocess;
pub mod service;

pub use config::Config;
pub use error::AppError;
pub use postprocess::{Detection, DisplayContext, ImageSize, PredictionResult};
pub use preprocess::LetterboxMetadata;
pub use service::{ModelServiceClient, Outcome, PredictOutcome, RequestCategory};
