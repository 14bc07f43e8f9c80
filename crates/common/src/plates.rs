//! License plate recognition contracts.
//!
//! These types are shared between the recognition service and its clients:
//! the intermediate values produced by the detector and the text reader, the
//! final recognized plates, and the JSON envelopes returned over HTTP.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel coordinates, serialized as `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Order the corners and clamp them into `[0, width] x [0, height]`.
    ///
    /// Non-finite coordinates collapse to zero.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let clamp = |v: f32, max: u32| {
            if v.is_finite() {
                v.clamp(0.0, max as f32)
            } else {
                0.0
            }
        };

        let (x1, x2) = (clamp(self.x1, width), clamp(self.x2, width));
        let (y1, y2) = (clamp(self.y1, height), clamp(self.y2, height));

        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Intersection over union of two boxes
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        };

        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// A candidate plate region reported by the object detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,

    /// Detector score in [0, 1]
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self { bbox, confidence }
    }
}

/// One contiguous text region read from a plate crop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSpan {
    pub text: String,

    /// Reader score in [0, 1]
    pub confidence: f32,
}

impl RecognizedSpan {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// A license plate that survived detection, recognition and normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedPlate {
    /// Normalized plate text
    pub plate_number: String,

    /// Fused detector/reader confidence in [0, 1]
    pub confidence: f32,

    /// Plate region, clamped to the image extent
    pub bbox: BoundingBox,
}

/// Response envelope for `POST /api/v1/license-plate/recognize`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResponse {
    pub success: bool,

    pub message: String,

    #[serde(default)]
    pub detections: Vec<RecognizedPlate>,

    /// Wall-clock processing time in seconds
    pub processing_time: f64,
}

impl RecognitionResponse {
    pub fn from_detections(detections: Vec<RecognizedPlate>, processing_time: f64) -> Self {
        let message = if detections.is_empty() {
            "No license plates detected in the image".to_string()
        } else {
            format!(
                "Successfully detected {} license plate(s)",
                detections.len()
            )
        };

        Self {
            success: true,
            message,
            detections,
            processing_time,
        }
    }
}

/// Error envelope shared by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, error_type: Option<&str>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_type: error_type.map(str::to_string),
        }
    }
}

/// Overall service state reported by the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Both models loaded
    Healthy,

    /// At least one model failed to load; requests are still accepted
    Degraded,
}

/// Response for `GET /api/v1/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,

    /// Whether the plate detector is loaded
    pub model_loaded: bool,

    /// Whether the text recognizer is loaded
    pub ocr_ready: bool,
}

impl HealthResponse {
    pub fn from_flags(model_loaded: bool, ocr_ready: bool) -> Self {
        let status = if model_loaded && ocr_ready {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        Self {
            status,
            model_loaded,
            ocr_ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_serializes_as_array() {
        let bbox = BoundingBox::new(1.5, 2.0, 30.0, 40.25);
        let json = serde_json::to_value(bbox).unwrap();
        assert_eq!(json, serde_json::json!([1.5, 2.0, 30.0, 40.25]));

        let back: BoundingBox = serde_json::from_value(json).unwrap();
        assert_eq!(back, bbox);
    }

    #[test]
    fn test_bbox_clamped() {
        let bbox = BoundingBox::new(-10.0, 5.0, 700.0, 500.0).clamped(640, 480);
        assert_eq!(bbox, BoundingBox::new(0.0, 5.0, 640.0, 480.0));

        // Swapped corners are reordered
        let swapped = BoundingBox::new(50.0, 60.0, 10.0, 20.0).clamped(640, 480);
        assert_eq!(swapped, BoundingBox::new(10.0, 20.0, 50.0, 60.0));

        let nan = BoundingBox::new(f32::NAN, 0.0, 10.0, 10.0).clamped(640, 480);
        assert_eq!(nan.x1, 0.0);
    }

    #[test]
    fn test_bbox_iou() {
        let a = BoundingBox::new(10.0, 10.0, 60.0, 30.0);
        let b = BoundingBox::new(30.0, 15.0, 80.0, 35.0);

        let iou = a.iou(&b);
        assert!(iou > 0.0 && iou < 1.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);

        let far = BoundingBox::new(100.0, 100.0, 150.0, 120.0);
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn test_recognition_response_messages() {
        let empty = RecognitionResponse::from_detections(vec![], 0.1);
        assert!(empty.success);
        assert_eq!(empty.message, "No license plates detected in the image");

        let plate = RecognizedPlate {
            plate_number: "AB1234".to_string(),
            confidence: 0.8,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        };
        let some = RecognitionResponse::from_detections(vec![plate.clone(), plate], 0.1);
        assert_eq!(some.message, "Successfully detected 2 license plate(s)");
    }

    #[test]
    fn test_health_response_status() {
        assert_eq!(
            HealthResponse::from_flags(true, true).status,
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthResponse::from_flags(true, false).status,
            HealthStatus::Degraded
        );

        let json = serde_json::to_value(HealthResponse::from_flags(false, true)).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["model_loaded"], false);
        assert_eq!(json["ocr_ready"], true);
    }

    #[test]
    fn test_error_response_shape() {
        let json = serde_json::to_value(ErrorResponse::new("boom", None)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "boom");
        assert!(json.get("error_type").is_none());
    }
}
