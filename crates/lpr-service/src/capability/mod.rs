//! External model capabilities consumed by the recognition pipeline.
//!
//! The pipeline only depends on these traits. Production implementations run
//! ONNX models through `ort`; the `mock` module provides deterministic
//! stand-ins. All calls are blocking and must be dispatched off the async
//! request threads (see [`crate::pool::InferencePool`]).

pub mod crnn;
pub mod mock;
pub mod session;
pub mod yolo;

use anyhow::Result;
use common::plates::{Detection, RecognizedSpan};
use image::{DynamicImage, RgbImage};
use std::sync::Arc;

use crate::config::LprServiceConfig;
use crnn::{CrnnRecognizerConfig, CrnnTextRecognizer};
use session::SessionOptions;
use yolo::{YoloDetectorConfig, YoloPlateDetector};

/// Default detector confidence threshold
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

/// Default detector IoU threshold
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Thresholds handed to the detector on every call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionThresholds {
    /// Minimum detector score for a candidate
    pub confidence: f32,

    /// Overlap above which the detector suppresses duplicate boxes
    pub iou: f32,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE_THRESHOLD,
            iou: DEFAULT_IOU_THRESHOLD,
        }
    }
}

/// Locates plate candidates in a decoded RGB image.
///
/// Implementations must tolerate concurrent calls from several inference
/// workers, serializing internally when the backing runtime requires it.
pub trait ObjectDetector: Send + Sync {
    /// Identifier used in logs and metrics
    fn id(&self) -> &'static str;

    /// Candidate boxes in image pixel coordinates, in the detector's own order
    fn detect(&self, image: &RgbImage, thresholds: DetectionThresholds) -> Result<Vec<Detection>>;
}

/// Reads text spans from a plate crop
pub trait TextRecognizer: Send + Sync {
    /// Identifier used in logs and metrics
    fn id(&self) -> &'static str;

    /// All text spans found in `image`; empty when nothing is legible
    fn read(&self, image: &DynamicImage) -> Result<Vec<RecognizedSpan>>;
}

/// One-time construction of the two model capabilities
pub trait ModelLoader: Send + Sync {
    fn load_detector(&self) -> Result<Arc<dyn ObjectDetector>>;

    fn load_recognizer(&self) -> Result<Arc<dyn TextRecognizer>>;
}

/// Loads the ONNX detector and recognizer named by the service configuration
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    detector: YoloDetectorConfig,
    recognizer: CrnnRecognizerConfig,
    session: SessionOptions,
}

impl OnnxModelLoader {
    pub fn new(
        detector: YoloDetectorConfig,
        recognizer: CrnnRecognizerConfig,
        session: SessionOptions,
    ) -> Self {
        Self {
            detector,
            recognizer,
            session,
        }
    }

    pub fn from_config(config: &LprServiceConfig) -> Self {
        Self::new(
            YoloDetectorConfig {
                model_path: config.detector_model_path.clone(),
                ..YoloDetectorConfig::default()
            },
            CrnnRecognizerConfig {
                model_path: config.recognizer_model_path.clone(),
                languages: config.ocr_languages.clone(),
                ..CrnnRecognizerConfig::default()
            },
            SessionOptions {
                use_gpu: config.use_gpu,
                ..SessionOptions::default()
            },
        )
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load_detector(&self) -> Result<Arc<dyn ObjectDetector>> {
        let detector = YoloPlateDetector::load(self.detector.clone(), &self.session)?;
        Ok(Arc::new(detector))
    }

    fn load_recognizer(&self) -> Result<Arc<dyn TextRecognizer>> {
        let recognizer = CrnnTextRecognizer::load(self.recognizer.clone(), &self.session)?;
        Ok(Arc::new(recognizer))
    }
}
