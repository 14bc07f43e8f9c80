/// Deterministic detector and recognizer for tests and model-less demos
use super::{DetectionThresholds, ModelLoader, ObjectDetector, TextRecognizer};
use anyhow::{anyhow, Result};
use common::plates::{BoundingBox, Detection, RecognizedSpan};
use image::{ColorType, DynamicImage, RgbImage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Detector returning a fixed candidate list
pub struct StaticDetector {
    detections: Vec<Detection>,
    relative: bool,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl StaticDetector {
    /// Candidates in absolute pixel coordinates, returned as-is
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            relative: false,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Candidates whose boxes are fractions of the image size
    pub fn relative(detections: Vec<Detection>) -> Self {
        Self {
            relative: true,
            ..Self::new(detections)
        }
    }

    /// Detector whose every call fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ObjectDetector for StaticDetector {
    fn id(&self) -> &'static str {
        "mock_plate_detector"
    }

    fn detect(&self, image: &RgbImage, thresholds: DetectionThresholds) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }

        let (w, h) = (image.width() as f32, image.height() as f32);
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence >= thresholds.confidence)
            .map(|d| {
                if self.relative {
                    let b = d.bbox;
                    Detection::new(
                        BoundingBox::new(b.x1 * w, b.y1 * h, b.x2 * w, b.y2 * h),
                        d.confidence,
                    )
                } else {
                    *d
                }
            })
            .collect())
    }
}

/// What the recognizer was asked to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognizerCall {
    pub width: u32,
    pub height: u32,

    /// `L8` for enhanced crops, `Rgb8` for raw crops
    pub color: ColorType,
}

/// Recognizer replaying scripted responses in call order.
///
/// Once the script is exhausted the fallback response is returned.
pub struct ScriptedRecognizer {
    script: Mutex<VecDeque<Result<Vec<RecognizedSpan>, String>>>,
    fallback: Vec<RecognizedSpan>,
    calls: Mutex<Vec<RecognizerCall>>,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Recognizer answering every call with the same spans
    pub fn constant(spans: Vec<RecognizedSpan>) -> Self {
        Self {
            fallback: spans,
            ..Self::new()
        }
    }

    /// Queue a successful response
    pub fn then(self, spans: Vec<RecognizedSpan>) -> Self {
        self.push(Ok(spans))
    }

    /// Queue an empty response
    pub fn then_empty(self) -> Self {
        self.push(Ok(Vec::new()))
    }

    /// Queue a failing response
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()))
    }

    fn push(self, entry: Result<Vec<RecognizedSpan>, String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
        self
    }

    pub fn calls(&self) -> Vec<RecognizerCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for ScriptedRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn id(&self) -> &'static str {
        "mock_plate_reader"
    }

    fn read(&self, image: &DynamicImage) -> Result<Vec<RecognizedSpan>> {
        self.calls
            .lock()
            .map_err(|e| anyhow!("recognizer call log poisoned: {}", e))?
            .push(RecognizerCall {
                width: image.width(),
                height: image.height(),
                color: image.color(),
            });

        let next = self
            .script
            .lock()
            .map_err(|e| anyhow!("recognizer script poisoned: {}", e))?
            .pop_front();

        match next {
            Some(Ok(spans)) => Ok(spans),
            Some(Err(message)) => Err(anyhow!("{}", message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Loader handing out pre-built capabilities, or failing per model
pub struct MockModelLoader {
    detector: Option<Arc<dyn ObjectDetector>>,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    loads: AtomicUsize,
}

impl MockModelLoader {
    pub fn new(
        detector: Option<Arc<dyn ObjectDetector>>,
        recognizer: Option<Arc<dyn TextRecognizer>>,
    ) -> Self {
        Self {
            detector,
            recognizer,
            loads: AtomicUsize::new(0),
        }
    }

    /// Demo models: one plate in the middle of every image reading `AB1234`
    pub fn demo() -> Self {
        let detector = StaticDetector::relative(vec![Detection::new(
            BoundingBox::new(0.25, 0.4, 0.75, 0.6),
            0.9,
        )]);
        let recognizer = ScriptedRecognizer::constant(vec![
            RecognizedSpan::new("AB", 0.9),
            RecognizedSpan::new("1234", 0.8),
        ]);

        Self::new(Some(Arc::new(detector)), Some(Arc::new(recognizer)))
    }

    /// Number of `load_detector` and `load_recognizer` calls made so far
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for MockModelLoader {
    fn load_detector(&self) -> Result<Arc<dyn ObjectDetector>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.detector
            .clone()
            .ok_or_else(|| anyhow!("mock detector unavailable"))
    }

    fn load_recognizer(&self) -> Result<Arc<dyn TextRecognizer>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.recognizer
            .clone()
            .ok_or_else(|| anyhow!("mock recognizer unavailable"))
    }
}
