/// HTTP client for the inference service.
///
/// `predict` runs the whole pipeline under one `predict` slot: letterbox, upload with retry, then
/// map boxes into the caller's space. When the service reports it has no inference backend the
/// fallback predictor fills in, and its result goes through the identical transform step.

use super::orchestrator::{Orchestrator, Outcome, RequestCategory, RetryPolicy};
use super::wire::{ModelStatus, PredictResponse};
use crate::config::Config;
use crate::error::AppError;
use crate::fallback::FallbackPredictor;
use crate::palette::color_mapping;
use crate::postprocess::detection::{Detection, ImageSize, PredictionResult};
use crate::postprocess::transform::{transform_detections, DisplayContext};
use crate::preprocess::encode::JPEG_MIME;
use crate::preprocess::letterbox::{preprocess, LetterboxMetadata, PreprocessedImage};
use image::RgbImage;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Url};
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

const STATUS_PATH: &str = "/api/model-status";
const PREDICT_PATH: &str = "/api/predict";
const UPLOAD_FILE_NAME: &str = "resized-image.jpg";

/// The three things a caller can be told about a prediction (permanent failure is the `Err` side).
#[derive(Debug, Clone, PartialEq)]
pub enum PredictOutcome {
    /// Detections from the service.
    Served(PredictionResult),
    /// Degraded: a synthetic approximation produced client-side.
    Synthetic(PredictionResult),
    /// Superseded or cancelled; nothing to show and nothing to report.
    Cancelled,
}

impl PredictOutcome {
    pub fn result(&self) -> Option<&PredictionResult> {
        match self {
            PredictOutcome::Served(result) | PredictOutcome::Synthetic(result) => Some(result),
            PredictOutcome::Cancelled => None,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, PredictOutcome::Synthetic(_))
    }
}

pub struct ModelServiceClient {
    config: Config,
    http: Client,
    status_url: Url,
    predict_url: Url,
    orchestrator: Orchestrator,
    fallback: Mutex<FallbackPredictor>,
}

impl ModelServiceClient {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let fallback = FallbackPredictor::new(config.input_size).with_jpeg_quality(config.jpeg_quality);
        Self::with_fallback(config, fallback)
    }

    /// `fallback` must be built for the same input size as `config`.
    pub fn with_fallback(config: Config, fallback: FallbackPredictor) -> Result<Self, AppError> {
        if config.input_size == 0 {
            return Err(AppError::Config("model input size must be positive".to_string()));
        }
        if fallback.input_size() != config.input_size {
            return Err(AppError::Config(format!(
                "fallback input size {} does not match model input size {}",
                fallback.input_size(),
                config.input_size
            )));
        }

        let base = config.base_url();
        let status_url = Url::parse(&format!("{base}{STATUS_PATH}"))
            .map_err(|e| AppError::Config(format!("Invalid API URL {base:?}: {e}")))?;
        let predict_url = Url::parse(&format!("{base}{PREDICT_PATH}"))
            .map_err(|e| AppError::Config(format!("Invalid API URL {base:?}: {e}")))?;

        let http = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            status_url,
            predict_url,
            orchestrator: Orchestrator::new(),
            fallback: Mutex::new(fallback),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Cancel one category, or everything when `None`.
    pub fn cancel(&self, category: Option<RequestCategory>) {
        self.orchestrator.cancel(category);
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.max_retries, self.config.retry_delay())
    }

    fn lock_fallback(&self) -> MutexGuard<'_, FallbackPredictor> {
        self.fallback.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Query model readiness. Mock-model notices are logged and surfaced, not acted on.
    pub async fn check_status(&self) -> Result<Outcome<ModelStatus>, AppError> {
        let outcome = self
            .orchestrator
            .execute::<ModelStatus, _>(RequestCategory::Status, &RetryPolicy::none(), || {
                Ok(self
                    .http
                    .get(self.status_url.clone())
                    .header(ACCEPT, "application/json"))
            })
            .await?;

        if let Outcome::Completed(status) = &outcome {
            if status.is_mock() {
                warn!(
                    model_type = status.model_type.as_deref().unwrap_or("unknown"),
                    "Service is using mock models: {}",
                    status.notice.as_deref().or(status.warning.as_deref()).unwrap_or("predictions are not real")
                );
            } else if status.is_ready() {
                info!("Service ready: {}", status.explanation.as_deref().or(status.message.as_deref()).unwrap_or("real model loaded"));
            } else {
                info!(status = %status.status, "Service not ready");
            }
        }

        Ok(outcome)
    }

    /// Run a prediction for `image` (encoded bytes of any supported format).
    ///
    /// With `display`, boxes come back in display space and `image_size` is the display size;
    /// without it they stay in model-input space.
    pub async fn predict(&self, image: &[u8], display: Option<DisplayContext>) -> Result<PredictOutcome, AppError> {
        info!(bytes = image.len(), "Starting prediction");

        let mut operation = self.orchestrator.start(RequestCategory::Predict);

        let data = image.to_vec();
        let input_size = self.config.input_size;
        let quality = self.config.jpeg_quality;
        let prepared = match operation
            .run(tokio::task::spawn_blocking(move || preprocess(&data, input_size, quality)))
            .await
        {
            Some(joined) => joined.map_err(|e| AppError::Encode(format!("preprocess task failed: {e}")))??,
            None => {
                info!("Prediction cancelled during preprocessing");
                return Ok(PredictOutcome::Cancelled);
            }
        };

        let response = operation
            .send::<PredictResponse, _>(&self.retry_policy(), || self.predict_request(&prepared))
            .await;

        match response {
            Ok(Outcome::Completed(body)) => {
                info!(count = body.predictions.len(), "Received predictions");
                Ok(PredictOutcome::Served(self.served_result(body, &prepared.meta, display.as_ref())))
            }
            Ok(Outcome::Cancelled) => {
                info!("Prediction request was cancelled");
                Ok(PredictOutcome::Cancelled)
            }
            Err(err) if err.is_capability_missing() => {
                warn!("Service has no inference backend, falling back to synthetic predictions");
                let synthetic = self.synthesize(Some(&prepared.canvas), &prepared.meta, display.as_ref())?;
                Ok(PredictOutcome::Synthetic(synthetic))
            }
            Err(err) => Err(err),
        }
    }

    /// Produce a synthetic result for `image` without contacting the service.
    ///
    /// Used at the caller's discretion, e.g. after a `Network` error.
    pub async fn synthesize_fallback(
        &self,
        image: Option<&[u8]>,
        display: Option<DisplayContext>,
    ) -> Result<PredictionResult, AppError> {
        let input_size = self.config.input_size;
        let prepared: Option<PreprocessedImage> = match image {
            Some(bytes) => {
                let data = bytes.to_vec();
                let quality = self.config.jpeg_quality;
                Some(
                    tokio::task::spawn_blocking(move || preprocess(&data, input_size, quality))
                        .await
                        .map_err(|e| AppError::Encode(format!("preprocess task failed: {e}")))??,
                )
            }
            None => None,
        };

        let meta = prepared
            .as_ref()
            .map(|p| p.meta)
            .unwrap_or_else(|| LetterboxMetadata::identity(input_size));

        self.synthesize(prepared.as_ref().map(|p| &p.canvas), &meta, display.as_ref())
    }

    fn synthesize(
        &self,
        canvas: Option<&RgbImage>,
        meta: &LetterboxMetadata,
        display: Option<&DisplayContext>,
    ) -> Result<PredictionResult, AppError> {
        let raw = self.lock_fallback().synthesize(canvas)?;
        Ok(into_requested_space(raw, meta, display))
    }

    fn served_result(
        &self,
        body: PredictResponse,
        meta: &LetterboxMetadata,
        display: Option<&DisplayContext>,
    ) -> PredictionResult {
        let image_size = body.image_size_or(self.config.input_size);
        let raw = PredictionResult {
            predictions: body.predictions.into_iter().map(Detection::from).collect(),
            clean_image: body.clean_image,
            annotated_image: body.annotated_image,
            image_size,
            message: body.message,
        };
        into_requested_space(raw, meta, display)
    }

    fn predict_request(&self, prepared: &PreprocessedImage) -> Result<RequestBuilder, AppError> {
        let part = Part::bytes(prepared.payload.clone())
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(JPEG_MIME)
            .map_err(|e| AppError::Encode(format!("multipart image part: {e}")))?;

        let mapping = serde_json::to_string(&color_mapping())
            .map_err(|e| AppError::Encode(format!("color mapping: {e}")))?;

        let form = Form::new().part("image", part).text("color_mapping", mapping);

        let mut request = self
            .http
            .post(self.predict_url.clone())
            .header(ACCEPT, "application/json")
            .multipart(form);

        if let Some(authorization) = self.config.authorization() {
            request = request.header(AUTHORIZATION, authorization);
        }

        Ok(request)
    }
}

/// Move a model-space result into the caller's space. Without a display it is returned as is.
fn into_requested_space(
    result: PredictionResult,
    meta: &LetterboxMetadata,
    display: Option<&DisplayContext>,
) -> PredictionResult {
    let Some(display) = display else {
        return result;
    };

    PredictionResult {
        predictions: transform_detections(result.predictions, meta, Some(display)),
        image_size: ImageSize {
            width: display.display_width,
            height: display.display_height,
        },
        ..result
    }
}
