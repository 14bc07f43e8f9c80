use crate::capability::{DetectionThresholds, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD};
use anyhow::{bail, Context, Result};
use common::validation::MAX_IMAGE_SIZE;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct LprServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Plate detection ONNX model
    pub detector_model_path: String,

    /// Plate OCR ONNX model
    pub recognizer_model_path: String,

    /// Minimum detector score for a plate candidate
    pub confidence_threshold: f32,

    /// Overlap threshold for the detector's duplicate suppression
    pub iou_threshold: f32,

    /// Recognizer language set
    pub ocr_languages: Vec<String>,

    /// Try the GPU execution provider
    pub use_gpu: bool,

    /// Largest accepted upload in bytes
    pub max_image_bytes: usize,

    /// Maximum concurrent pipeline runs
    pub inference_workers: usize,

    /// Serve with deterministic mock models instead of ONNX
    pub use_mock_models: bool,
}

impl Default for LprServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            detector_model_path: "models/lp_detection.onnx".to_string(),
            recognizer_model_path: "models/lp_ocr.onnx".to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            ocr_languages: vec!["en".to_string()],
            use_gpu: false,
            max_image_bytes: MAX_IMAGE_SIZE,
            inference_workers: default_workers(),
            use_mock_models: false,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl LprServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            bind_addr: lookup("LPR_SERVICE_ADDR").unwrap_or(defaults.bind_addr),
            detector_model_path: lookup("LPR_DETECTOR_MODEL")
                .unwrap_or(defaults.detector_model_path),
            recognizer_model_path: lookup("LPR_RECOGNIZER_MODEL")
                .unwrap_or(defaults.recognizer_model_path),
            confidence_threshold: parse_var(
                &lookup,
                "LPR_CONF_THRESHOLD",
                defaults.confidence_threshold,
            )?,
            iou_threshold: parse_var(&lookup, "LPR_IOU_THRESHOLD", defaults.iou_threshold)?,
            ocr_languages: match lookup("LPR_OCR_LANGUAGES") {
                Some(raw) => parse_languages(&raw),
                None => defaults.ocr_languages,
            },
            use_gpu: parse_flag(&lookup, "LPR_OCR_GPU", defaults.use_gpu)?,
            max_image_bytes: parse_var(&lookup, "LPR_MAX_IMAGE_BYTES", defaults.max_image_bytes)?,
            inference_workers: parse_var(
                &lookup,
                "LPR_INFERENCE_WORKERS",
                defaults.inference_workers,
            )?,
            use_mock_models: parse_flag(&lookup, "LPR_USE_MOCK_MODELS", defaults.use_mock_models)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            bail!(
                "LPR_CONF_THRESHOLD must be within [0, 1], got {}",
                self.confidence_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            bail!(
                "LPR_IOU_THRESHOLD must be within [0, 1], got {}",
                self.iou_threshold
            );
        }
        if self.ocr_languages.is_empty() {
            bail!("LPR_OCR_LANGUAGES must name at least one language");
        }
        if self.inference_workers == 0 {
            bail!("LPR_INFERENCE_WORKERS must be at least 1");
        }
        if self.max_image_bytes == 0 {
            bail!("LPR_MAX_IMAGE_BYTES must be positive");
        }
        Ok(())
    }

    pub fn thresholds(&self) -> DetectionThresholds {
        DetectionThresholds {
            confidence: self.confidence_threshold,
            iou: self.iou_threshold,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("Invalid {}: {:?}", key, raw),
        },
        None => Ok(default),
    }
}

fn parse_languages(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|lang| lang.trim().to_lowercase())
        .filter(|lang| !lang.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LprServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.confidence_threshold, 0.25);
        assert_eq!(config.iou_threshold, 0.45);
        assert_eq!(config.ocr_languages, vec!["en".to_string()]);
        assert!(!config.use_gpu);
        assert_eq!(config.max_image_bytes, 10 * 1024 * 1024);
        assert!(config.inference_workers >= 1);
        assert!(!config.use_mock_models);
    }

    #[test]
    fn test_overrides() {
        let config = LprServiceConfig::from_lookup(lookup(&[
            ("LPR_SERVICE_ADDR", "127.0.0.1:9000"),
            ("LPR_CONF_THRESHOLD", "0.5"),
            ("LPR_IOU_THRESHOLD", " 0.3 "),
            ("LPR_OCR_LANGUAGES", "EN, vi ,"),
            ("LPR_OCR_GPU", "true"),
            ("LPR_INFERENCE_WORKERS", "2"),
            ("LPR_USE_MOCK_MODELS", "1"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.thresholds().confidence, 0.5);
        assert_eq!(config.thresholds().iou, 0.3);
        assert_eq!(config.ocr_languages, vec!["en".to_string(), "vi".to_string()]);
        assert!(config.use_gpu);
        assert_eq!(config.inference_workers, 2);
        assert!(config.use_mock_models);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(LprServiceConfig::from_lookup(lookup(&[("LPR_CONF_THRESHOLD", "1.5")])).is_err());
        assert!(LprServiceConfig::from_lookup(lookup(&[("LPR_IOU_THRESHOLD", "abc")])).is_err());
        assert!(LprServiceConfig::from_lookup(lookup(&[("LPR_INFERENCE_WORKERS", "0")])).is_err());
        assert!(LprServiceConfig::from_lookup(lookup(&[("LPR_OCR_LANGUAGES", " , ")])).is_err());
        assert!(LprServiceConfig::from_lookup(lookup(&[("LPR_OCR_GPU", "maybe")])).is_err());
    }
}
