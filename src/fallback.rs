/// Client-side synthetic predictions for when the service lacks its inference backend.
///
/// Output follows the served contract exactly: boxes in model-input space, a clean and an
/// annotated payload, `image_size` equal to the input size. Callers push it through the same
/// coordinate transform as a served result.
///
/// Label bars carry `"{class}: {pct}%"` text only when a font is supplied with `with_font`; no font
/// ships with the crate, so by default the bar is drawn without text.

use crate::config::DEFAULT_JPEG_QUALITY;
use crate::error::AppError;
use crate::palette::rgb_for;
use crate::postprocess::detection::{BBox, Detection, ImageSize, PredictionResult};
use crate::preprocess::encode::{encode_jpeg, encode_png, to_data_url, JPEG_MIME, PNG_MIME};
use ab_glyph::{FontArc, PxScale};
use image::{imageops::FilterType, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

/// Regions below are laid out on this canvas size and scaled to the configured input size.
const REFERENCE_SIZE: f64 = 512.0;
pub const SCORE_MIN: f64 = 0.65;
pub const SCORE_MAX: f64 = 0.95;
const BOX_THICKNESS: i32 = 3;
const LABEL_BAR_WIDTH: i32 = 120;
const LABEL_BAR_HEIGHT: i32 = 20;
const LABEL_FONT_SIZE: f32 = 14.0;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockFinding {
    Cardiomegaly,
    PleuralEffusion,
    NoduleMass,
    Infiltration,
}

impl MockFinding {
    const ALL: [MockFinding; 4] = [
        MockFinding::Cardiomegaly,
        MockFinding::PleuralEffusion,
        MockFinding::NoduleMass,
        MockFinding::Infiltration,
    ];

    fn label(self) -> &'static str {
        match self {
            MockFinding::Cardiomegaly => "Cardiomegaly",
            MockFinding::PleuralEffusion => "Pleural effusion",
            MockFinding::NoduleMass => "Nodule/Mass",
            MockFinding::Infiltration => "Infiltration",
        }
    }

    /// Plausible anatomical region on a 512 canvas.
    fn sample_box<R: Rng>(self, rng: &mut R) -> BBox {
        let mut r = || rng.gen::<f64>();
        match self {
            // heart
            MockFinding::Cardiomegaly => [150.0 + 50.0 * r(), 120.0 + 50.0 * r(), 300.0 + 50.0 * r(), 300.0 + 50.0 * r()],
            // lower lateral lung
            MockFinding::PleuralEffusion => [80.0 + 30.0 * r(), 250.0 + 50.0 * r(), 150.0 + 30.0 * r(), 400.0 + 20.0 * r()],
            // anywhere in the lung field
            MockFinding::NoduleMass => {
                let x1 = 120.0 + 200.0 * r();
                let y1 = 100.0 + 200.0 * r();
                [x1, y1, x1 + 50.0 + 30.0 * r(), y1 + 50.0 + 30.0 * r()]
            }
            // upper lung
            MockFinding::Infiltration => [120.0 + 50.0 * r(), 100.0 + 50.0 * r(), 220.0 + 50.0 * r(), 200.0 + 50.0 * r()],
        }
    }
}

pub struct FallbackPredictor {
    rng: StdRng,
    input_size: u32,
    jpeg_quality: u8,
    font: Option<FontArc>,
}

impl FallbackPredictor {
    pub fn new(input_size: u32) -> Self {
        Self::from_rng(StdRng::from_entropy(), input_size)
    }

    /// Deterministic predictor for tests and reproducible demos.
    pub fn with_seed(input_size: u32, seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed), input_size)
    }

    fn from_rng(rng: StdRng, input_size: u32) -> Self {
        Self {
            rng,
            input_size,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            font: None,
        }
    }

    /// Quality of the clean JPEG payload.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Font for the label text on annotated images.
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// One or two synthetic detections in model-input space.
    pub fn synthesize_detections(&mut self) -> Vec<Detection> {
        let scale = self.input_size as f64 / REFERENCE_SIZE;
        let count = self.rng.gen_range(1..=2);

        (0..count)
            .map(|_| {
                let finding = MockFinding::ALL[self.rng.gen_range(0..MockFinding::ALL.len())];
                let bbox = finding.sample_box(&mut self.rng).map(|v| v * scale);
                let score = SCORE_MIN + self.rng.gen::<f64>() * (SCORE_MAX - SCORE_MIN);
                Detection::new(bbox, finding.label(), score)
            })
            .collect()
    }

    /// Full synthetic result. `image` is the model-input canvas when one is available; otherwise a
    /// blank white canvas stands in.
    pub fn synthesize(&mut self, image: Option<&RgbImage>) -> Result<PredictionResult, AppError> {
        warn!("Generating synthetic predictions client-side");

        let size = self.input_size;
        if size == 0 {
            return Err(AppError::Config("fallback input size must be positive".to_string()));
        }

        let canvas = match image {
            Some(img) if img.dimensions() == (size, size) => img.clone(),
            Some(img) => image::imageops::resize(img, size, size, FilterType::Triangle),
            None => RgbImage::from_pixel(size, size, Rgb([255, 255, 255])),
        };

        let predictions = self.synthesize_detections();

        let mut annotated = canvas.clone();
        for det in &predictions {
            draw_detection(&mut annotated, det, self.font.as_ref());
        }

        let clean_image = to_data_url(JPEG_MIME, &encode_jpeg(&canvas, self.jpeg_quality)?);
        let annotated_image = to_data_url(PNG_MIME, &encode_png(&annotated)?);

        debug!(count = predictions.len(), "Synthetic predictions ready");

        Ok(PredictionResult {
            predictions,
            clean_image,
            annotated_image,
            image_size: ImageSize::square(size),
            message: None,
        })
    }
}

/// `Cardiomegaly: 87%`
pub fn label_text(det: &Detection) -> String {
    format!("{}: {}%", det.class_label, (det.score * 100.0).round() as i64)
}

/// Outline the box in its class color and put a label bar above it.
fn draw_detection(canvas: &mut RgbImage, det: &Detection, font: Option<&FontArc>) {
    let color = Rgb(rgb_for(&det.class_label));
    let (w, h) = (canvas.width() as i32, canvas.height() as i32);

    let x1 = (det.bbox[0].round() as i32).clamp(0, w - 1);
    let y1 = (det.bbox[1].round() as i32).clamp(0, h - 1);
    let x2 = (det.bbox[2].round() as i32).clamp(0, w - 1);
    let y2 = (det.bbox[3].round() as i32).clamp(0, h - 1);

    for t in 0..BOX_THICKNESS {
        let box_w = x2 - x1 - 2 * t;
        let box_h = y2 - y1 - 2 * t;
        if box_w <= 0 || box_h <= 0 {
            break;
        }
        draw_hollow_rect_mut(canvas, Rect::at(x1 + t, y1 + t).of_size(box_w as u32, box_h as u32), color);
    }

    let bar_y = (y1 - LABEL_BAR_HEIGHT).max(0);
    let bar_w = LABEL_BAR_WIDTH.min(w - x1);
    if bar_w > 0 {
        draw_filled_rect_mut(canvas, Rect::at(x1, bar_y).of_size(bar_w as u32, LABEL_BAR_HEIGHT as u32), color);
        if let Some(font) = font {
            draw_text_mut(
                canvas,
                LABEL_TEXT_COLOR,
                x1 + 5,
                bar_y + 3,
                PxScale::from(LABEL_FONT_SIZE),
                font,
                &label_text(det),
            );
        }
    }
}
