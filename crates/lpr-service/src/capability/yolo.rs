/// License plate detector backed by a single-class YOLOv8 ONNX model
///
/// The model takes a square RGB tensor in NCHW layout normalized to [0, 1] and
/// emits `[batch, 5, num_predictions]` rows of (cx, cy, w, h, score) in input
/// pixel space.
use super::session::{create_session, SessionOptions};
use super::{DetectionThresholds, ObjectDetector};
use anyhow::{bail, Context, Result};
use common::plates::{BoundingBox, Detection};
use image::RgbImage;
use ndarray::{Array, IxDyn};
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloDetectorConfig {
    /// Path to the plate detection ONNX model file
    pub model_path: String,

    /// Detection model input size (width and height)
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Maximum number of plates kept per image
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
}

fn default_input_size() -> u32 {
    640
}

fn default_max_detections() -> usize {
    10
}

impl Default for YoloDetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/lp_detection.onnx".to_string(),
            input_size: default_input_size(),
            max_detections: default_max_detections(),
        }
    }
}

pub struct YoloPlateDetector {
    config: YoloDetectorConfig,
    session: Mutex<Session>,
    execution_provider: String,
}

impl YoloPlateDetector {
    pub fn load(config: YoloDetectorConfig, options: &SessionOptions) -> Result<Self> {
        let (session, execution_provider) = create_session(&config.model_path, options)
            .with_context(|| format!("loading plate detector from {}", config.model_path))?;

        tracing::info!(
            path = %config.model_path,
            provider = %execution_provider,
            input_size = config.input_size,
            "Initialized plate detection model"
        );

        Ok(Self {
            config,
            session: Mutex::new(session),
            execution_provider,
        })
    }

    pub fn execution_provider(&self) -> &str {
        &self.execution_provider
    }

    /// Preprocess image for detection model
    fn preprocess(&self, img: &RgbImage) -> Array<f32, IxDyn> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(img, size, size, image::imageops::FilterType::Triangle);

        // Convert to NCHW format and normalize to [0, 1]
        let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }

        input
    }
}

impl ObjectDetector for YoloPlateDetector {
    fn id(&self) -> &'static str {
        "yolov8_plate_detector"
    }

    fn detect(&self, image: &RgbImage, thresholds: DetectionThresholds) -> Result<Vec<Detection>> {
        let input_tensor = Value::from_array(self.preprocess(image))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock detection session: {}", e))?;
        let outputs = session.run(ort::inputs![input_tensor])?;

        // Get detection output - try common YOLO output names
        let output_value = outputs
            .get("output0")
            .or_else(|| outputs.get("output"))
            .or_else(|| outputs.get("boxes"))
            .context("No detection output tensor found (tried: output0, output, boxes)")?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;

        let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())?;

        decode_predictions(
            &output,
            image.width(),
            image.height(),
            self.config.input_size,
            thresholds,
            self.config.max_detections,
        )
    }
}

/// Turn raw YOLOv8 rows into plate detections in original image coordinates
pub fn decode_predictions(
    output: &Array<f32, IxDyn>,
    original_width: u32,
    original_height: u32,
    input_size: u32,
    thresholds: DetectionThresholds,
    max_detections: usize,
) -> Result<Vec<Detection>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[1] < 5 {
        bail!("unexpected detection output shape {:?}, expected [1, 5, N]", shape);
    }

    let scale_x = original_width as f32 / input_size as f32;
    let scale_y = original_height as f32 / input_size as f32;

    let mut candidates = Vec::new();
    for i in 0..shape[2] {
        let confidence = output[[0, 4, i]];
        if !confidence.is_finite() || confidence < thresholds.confidence {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];

        let bbox = BoundingBox::new(
            (cx - w / 2.0) * scale_x,
            (cy - h / 2.0) * scale_y,
            (cx + w / 2.0) * scale_x,
            (cy + h / 2.0) * scale_y,
        )
        .clamped(original_width, original_height);

        candidates.push(Detection::new(bbox, confidence.min(1.0)));
    }

    let mut kept = non_max_suppression(candidates, thresholds.iou);
    kept.truncate(max_detections);
    Ok(kept)
}

/// Greedy NMS; the result is sorted by descending confidence
pub fn non_max_suppression(mut boxes: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in boxes {
        if keep
            .iter()
            .all(|kept| kept.bbox.iou(&candidate.bbox) < iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}
