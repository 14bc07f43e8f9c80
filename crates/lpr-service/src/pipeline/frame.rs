//! Image decoding and region cropping
use crate::error::PipelineError;
use common::plates::BoundingBox;
use image::{imageops, RgbImage};

/// Decode raw upload bytes into an 8-bit RGB buffer.
///
/// Channel order is always R, G, B; alpha is discarded and grayscale inputs
/// are expanded to three channels.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::Decode("image payload is empty".to_string()));
    }

    let decoded =
        image::load_from_memory(bytes).map_err(|e| PipelineError::Decode(e.to_string()))?;
    let rgb = decoded.to_rgb8();

    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(PipelineError::Decode("image has no pixels".to_string()));
    }

    Ok(rgb)
}

/// Cut `bbox` out of `image`.
///
/// Coordinates are truncated toward zero and clamped to the image extent.
/// Returns `None` when nothing is left.
pub fn crop_region(image: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let (width, height) = image.dimensions();

    let clamp = |v: f32, max: u32| -> u32 {
        if !v.is_finite() || v <= 0.0 {
            0
        } else {
            (v.trunc() as u32).min(max)
        }
    };

    let x1 = clamp(bbox.x1, width);
    let y1 = clamp(bbox.y1, height);
    let x2 = clamp(bbox.x2, width);
    let y2 = clamp(bbox.y2, height);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image())
}
