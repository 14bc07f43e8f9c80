//! Detection and recognition pipeline.
//!
//! A run decodes the upload, asks the detector for plate candidates and then,
//! for each candidate independently, crops, enhances, reads and normalizes
//! the plate text. Decode and detection failures abort the run; anything
//! going wrong for a single candidate only drops that candidate.

pub mod enhance;
pub mod frame;
pub mod normalize;

use crate::capability::{DetectionThresholds, ObjectDetector, TextRecognizer};
use crate::error::PipelineError;
use common::plates::{Detection, RecognizedPlate, RecognizedSpan};
use image::{DynamicImage, RgbImage};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics::{LPR_CANDIDATES, LPR_OCR_FALLBACKS, LPR_PIPELINE_LATENCY, LPR_STAGE_LATENCY};

pub use enhance::{EnhanceParams, OcrPreprocessor};
pub use frame::{crop_region, decode_image};
pub use normalize::normalize_plate_text;

/// Why a candidate did not make it into the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dropped {
    EmptyCrop,
    NoText,
    EmptyNormalized,
    RecognizerError,
}

impl Dropped {
    fn as_str(&self) -> &'static str {
        match self {
            Dropped::EmptyCrop => "empty_crop",
            Dropped::NoText => "no_text",
            Dropped::EmptyNormalized => "empty_normalized",
            Dropped::RecognizerError => "recognizer_error",
        }
    }
}

/// Combined score of a detection and the spans read from its crop.
///
/// Mean of the detector score and the mean span score, clamped into [0, 1].
/// Without spans the detector score stands alone.
pub fn fuse_confidence(detection: f32, spans: &[RecognizedSpan]) -> f32 {
    let fused = if spans.is_empty() {
        detection
    } else {
        let ocr = spans.iter().map(|s| s.confidence).sum::<f32>() / spans.len() as f32;
        (detection + ocr) / 2.0
    };

    if fused.is_finite() {
        fused.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Owns the two model capabilities and runs requests through them
pub struct DetectionPipeline {
    detector: Arc<dyn ObjectDetector>,
    recognizer: Arc<dyn TextRecognizer>,
    preprocessor: OcrPreprocessor,
    thresholds: DetectionThresholds,
}

impl DetectionPipeline {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        recognizer: Arc<dyn TextRecognizer>,
        thresholds: DetectionThresholds,
    ) -> Self {
        Self {
            detector,
            recognizer,
            preprocessor: OcrPreprocessor::default(),
            thresholds,
        }
    }

    pub fn thresholds(&self) -> DetectionThresholds {
        self.thresholds
    }

    /// Recognize every plate in an encoded image.
    ///
    /// Blocking; plates come back in detector order.
    pub fn run(&self, image_bytes: &[u8]) -> Result<Vec<RecognizedPlate>, PipelineError> {
        let start = Instant::now();

        let decode_start = Instant::now();
        let image = decode_image(image_bytes)?;
        LPR_STAGE_LATENCY
            .with_label_values(&["decode"])
            .observe(decode_start.elapsed().as_secs_f64());

        let detect_start = Instant::now();
        let candidates = self
            .detector
            .detect(&image, self.thresholds)
            .map_err(|e| PipelineError::Detection(format!("{:#}", e)))?;
        LPR_STAGE_LATENCY
            .with_label_values(&["detect"])
            .observe(detect_start.elapsed().as_secs_f64());

        tracing::debug!(
            detector = self.detector.id(),
            candidates = candidates.len(),
            width = image.width(),
            height = image.height(),
            "Plate candidates detected"
        );

        let mut plates = Vec::with_capacity(candidates.len());
        for (index, candidate) in candidates.iter().enumerate() {
            match self.process_candidate(&image, candidate) {
                Ok(plate) => {
                    LPR_CANDIDATES.with_label_values(&["recognized"]).inc();
                    plates.push(plate);
                }
                Err(reason) => {
                    LPR_CANDIDATES.with_label_values(&[reason.as_str()]).inc();
                    tracing::debug!(
                        candidate = index,
                        confidence = candidate.confidence,
                        reason = reason.as_str(),
                        "Dropped plate candidate"
                    );
                }
            }
        }

        let elapsed = start.elapsed();
        LPR_PIPELINE_LATENCY.observe(elapsed.as_secs_f64());
        tracing::info!(
            candidates = candidates.len(),
            plates = plates.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Recognition pipeline finished"
        );

        Ok(plates)
    }

    fn process_candidate(
        &self,
        image: &RgbImage,
        candidate: &Detection,
    ) -> Result<RecognizedPlate, Dropped> {
        let crop = crop_region(image, &candidate.bbox).ok_or(Dropped::EmptyCrop)?;

        let recognize_start = Instant::now();
        let spans = self.read_with_fallback(crop)?;
        LPR_STAGE_LATENCY
            .with_label_values(&["recognize"])
            .observe(recognize_start.elapsed().as_secs_f64());

        let raw: String = spans.iter().map(|s| s.text.as_str()).collect();
        let plate_number = normalize_plate_text(&raw);
        if plate_number.is_empty() {
            return Err(Dropped::EmptyNormalized);
        }

        Ok(RecognizedPlate {
            plate_number,
            confidence: fuse_confidence(candidate.confidence, &spans),
            bbox: candidate.bbox.clamped(image.width(), image.height()),
        })
    }

    /// Read the enhanced crop, retrying once on the raw crop when it reads
    /// empty. A recognizer error drops the candidate without a retry.
    fn read_with_fallback(&self, crop: RgbImage) -> Result<Vec<RecognizedSpan>, Dropped> {
        let enhanced = self.preprocessor.enhance(&crop);

        let spans = self
            .recognizer
            .read(&enhanced)
            .map_err(|e| self.recognizer_failed("enhanced", e))?;
        if !spans.is_empty() {
            return Ok(spans);
        }

        LPR_OCR_FALLBACKS.inc();
        tracing::debug!("No text on enhanced crop, retrying raw crop");

        let raw = DynamicImage::ImageRgb8(crop);
        let spans = self
            .recognizer
            .read(&raw)
            .map_err(|e| self.recognizer_failed("raw", e))?;
        if spans.is_empty() {
            return Err(Dropped::NoText);
        }
        Ok(spans)
    }

    fn recognizer_failed(&self, crop: &'static str, error: anyhow::Error) -> Dropped {
        tracing::warn!(
            recognizer = self.recognizer.id(),
            crop,
            error = %format!("{:#}", error),
            "Reading plate crop failed"
        );
        Dropped::RecognizerError
    }
}
