//! Legibility enhancement of plate crops ahead of text recognition.
//!
//! grayscale -> bilateral smoothing -> Gaussian adaptive threshold -> closing
use anyhow::{bail, Result};
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::{filter, morphology};

/// Parameters of the enhancement chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhanceParams {
    /// Bilateral filter neighborhood diameter
    pub smoothing_window: u32,

    /// Bilateral filter intensity sigma
    pub sigma_color: f32,

    /// Bilateral filter spatial sigma
    pub sigma_space: f32,

    /// Adaptive threshold block size, odd
    pub block_size: u32,

    /// Constant subtracted from the local weighted mean
    pub bias: f32,

    /// Closing structuring element radius (1 => 3x3 square)
    pub closing_radius: u8,
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self {
            smoothing_window: 11,
            sigma_color: 17.0,
            sigma_space: 17.0,
            block_size: 11,
            bias: 2.0,
            closing_radius: 1,
        }
    }
}

impl EnhanceParams {
    fn validate(&self) -> Result<()> {
        if self.smoothing_window == 0 {
            bail!("smoothing window must be positive");
        }
        if self.block_size < 3 || self.block_size % 2 == 0 {
            bail!("block size must be odd and at least 3, got {}", self.block_size);
        }
        if !(self.sigma_color > 0.0 && self.sigma_space > 0.0) {
            bail!("bilateral sigmas must be positive");
        }
        Ok(())
    }
}

/// Best-effort crop enhancer
#[derive(Debug, Clone, Default)]
pub struct OcrPreprocessor {
    params: EnhanceParams,
}

impl OcrPreprocessor {
    pub fn new(params: EnhanceParams) -> Self {
        Self { params }
    }

    /// Run the full chain, failing on invalid parameters or an empty crop
    pub fn try_enhance(&self, crop: &RgbImage) -> Result<GrayImage> {
        self.params.validate()?;
        if crop.width() == 0 || crop.height() == 0 {
            bail!("cannot enhance an empty crop");
        }

        let gray = DynamicImage::ImageRgb8(crop.clone()).to_luma8();
        let smoothed = bilateral_filter(
            &gray,
            self.params.smoothing_window / 2,
            self.params.sigma_color,
            self.params.sigma_space,
        );
        let binary = adaptive_threshold_gaussian(&smoothed, self.params.block_size, self.params.bias);

        Ok(morphology::close(&binary, Norm::LInf, self.params.closing_radius))
    }

    /// Enhanced crop, or the unmodified crop when enhancement fails
    pub fn enhance(&self, crop: &RgbImage) -> DynamicImage {
        match self.try_enhance(crop) {
            Ok(enhanced) => DynamicImage::ImageLuma8(enhanced),
            Err(e) => {
                tracing::warn!(error = %e, "Crop enhancement failed, using raw crop");
                DynamicImage::ImageRgb8(crop.clone())
            }
        }
    }
}

/// Edge-preserving smoothing over a `(2 * radius + 1)` square window
fn bilateral_filter(img: &GrayImage, radius: u32, sigma_color: f32, sigma_space: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut output = GrayImage::new(w, h);
    let color_denom = 2.0 * sigma_color * sigma_color;
    let space_denom = 2.0 * sigma_space * sigma_space;
    let r = radius as i64;

    // Spatial weights depend only on the offset
    let side = (2 * radius + 1) as usize;
    let mut spatial = vec![0.0f32; side * side];
    for dy in -r..=r {
        for dx in -r..=r {
            let dist_sq = (dx * dx + dy * dy) as f32;
            // Circular neighborhood
            if dist_sq <= (r * r) as f32 {
                spatial[((dy + r) as usize) * side + (dx + r) as usize] =
                    (-dist_sq / space_denom).exp();
            }
        }
    }

    for y in 0..h {
        for x in 0..w {
            let center = img.get_pixel(x, y).0[0] as f32;
            let mut sum = 0.0f32;
            let mut weight_sum = 0.0f32;

            for dy in -r..=r {
                let ny = y as i64 + dy;
                if ny < 0 || ny >= h as i64 {
                    continue;
                }
                for dx in -r..=r {
                    let nx = x as i64 + dx;
                    if nx < 0 || nx >= w as i64 {
                        continue;
                    }

                    let space_weight = spatial[((dy + r) as usize) * side + (dx + r) as usize];
                    if space_weight == 0.0 {
                        continue;
                    }

                    let value = img.get_pixel(nx as u32, ny as u32).0[0] as f32;
                    let diff = value - center;
                    let weight = space_weight * (-(diff * diff) / color_denom).exp();

                    sum += value * weight;
                    weight_sum += weight;
                }
            }

            let out = if weight_sum > 0.0 {
                (sum / weight_sum).round().clamp(0.0, 255.0) as u8
            } else {
                center as u8
            };
            output.put_pixel(x, y, Luma([out]));
        }
    }

    output
}

/// Gaussian kernel used for the local mean, normalized to sum 1
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i64;
    let weights: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = weights.iter().sum();
    weights.iter().map(|w| w / total).collect()
}

/// Binarize against a Gaussian-weighted local mean minus `bias`.
///
/// The mean is taken at 8-bit precision with edge pixels replicated, and the
/// bias is rounded up to a whole intensity step. Pixels strictly above the
/// threshold become 255, others 0.
fn adaptive_threshold_gaussian(img: &GrayImage, block_size: u32, bias: f32) -> GrayImage {
    let mean = filter::separable_filter_equal(img, &gaussian_kernel(block_size));
    let delta = bias.ceil() as i32;

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let value = img.get_pixel(x, y).0[0] as i32;
        let local = mean.get_pixel(x, y).0[0] as i32;
        Luma([if value - local > -delta { 255 } else { 0 }])
    })
}
