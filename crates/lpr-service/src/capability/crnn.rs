/// Plate text reader backed by a CRNN ONNX model with CTC output
///
/// A crop is read as a single span: the whole plate is fed to the model and
/// greedy CTC decoding produces the text plus the mean per-character score.
use super::session::{create_session, SessionOptions};
use super::TextRecognizer;
use anyhow::{bail, Context, Result};
use common::plates::RecognizedSpan;
use image::DynamicImage;
use ndarray::{Array, IxDyn};
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Characters readable for the `en` language set; CTC blank is index 0
pub const LATIN_PLATE_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrnnRecognizerConfig {
    /// Path to the OCR ONNX model file
    pub model_path: String,

    /// Language set the model was trained for
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// OCR model input width
    #[serde(default = "default_input_width")]
    pub input_width: u32,

    /// OCR model input height
    #[serde(default = "default_input_height")]
    pub input_height: u32,
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_input_width() -> u32 {
    200
}

fn default_input_height() -> u32 {
    64
}

impl Default for CrnnRecognizerConfig {
    fn default() -> Self {
        Self {
            model_path: "models/lp_ocr.onnx".to_string(),
            languages: default_languages(),
            input_width: default_input_width(),
            input_height: default_input_height(),
        }
    }
}

/// Resolve the CTC vocabulary for a language set
pub fn charset_for_languages(languages: &[String]) -> Result<Vec<char>> {
    if languages.is_empty() {
        bail!("recognizer language set is empty");
    }

    for lang in languages {
        match lang.trim().to_lowercase().as_str() {
            "en" => {}
            other => bail!("unsupported recognizer language '{}'", other),
        }
    }

    Ok(LATIN_PLATE_CHARSET.chars().collect())
}

pub struct CrnnTextRecognizer {
    config: CrnnRecognizerConfig,
    vocab: Vec<char>,
    session: Mutex<Session>,
}

impl CrnnTextRecognizer {
    pub fn load(config: CrnnRecognizerConfig, options: &SessionOptions) -> Result<Self> {
        let vocab = charset_for_languages(&config.languages)?;
        let (session, provider) = create_session(&config.model_path, options)
            .with_context(|| format!("loading text recognizer from {}", config.model_path))?;

        tracing::info!(
            path = %config.model_path,
            provider = %provider,
            languages = ?config.languages,
            "Initialized plate OCR model"
        );

        Ok(Self {
            config,
            vocab,
            session: Mutex::new(session),
        })
    }

    /// Preprocess a plate image for the OCR model
    fn preprocess(&self, img: &DynamicImage) -> Array<f32, IxDyn> {
        let width = self.config.input_width;
        let height = self.config.input_height;
        let resized = img.resize_exact(width, height, image::imageops::FilterType::Triangle);
        let gray_img = resized.to_luma8();

        // Convert to NCHW format and normalize to [0, 1]
        let mut input = Array::zeros(IxDyn(&[1, 1, height as usize, width as usize]));

        for (x, y, pixel) in gray_img.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
        }

        input
    }
}

impl TextRecognizer for CrnnTextRecognizer {
    fn id(&self) -> &'static str {
        "crnn_plate_reader"
    }

    fn read(&self, image: &DynamicImage) -> Result<Vec<RecognizedSpan>> {
        let input_tensor = Value::from_array(self.preprocess(image))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock OCR session: {}", e))?;
        let outputs = session.run(ort::inputs![input_tensor])?;

        // Different OCR exports name the output differently
        let output_value = outputs
            .get("output")
            .or_else(|| outputs.get("output0"))
            .or_else(|| outputs.get("logits"))
            .context("No OCR output tensor found (tried: output, output0, logits)")?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;

        let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())?;

        let (text, confidence) = ctc_greedy_decode(&output, &self.vocab)?;
        if text.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![RecognizedSpan::new(text, confidence)])
    }
}

/// Greedy CTC decoding over `[batch, timesteps, classes]`.
///
/// Returns the text and the mean probability of the emitted characters. Rows
/// that are not already a probability distribution are softmaxed first.
pub fn ctc_greedy_decode(output: &Array<f32, IxDyn>, vocab: &[char]) -> Result<(String, f32)> {
    let shape = output.shape();
    if shape.len() != 3 {
        bail!("unexpected OCR output shape {:?}, expected [1, T, C]", shape);
    }
    let (timesteps, classes) = (shape[1], shape[2]);

    let mut text = String::new();
    let mut scores = Vec::new();
    let mut prev_idx = 0usize;

    for t in 0..timesteps {
        let row: Vec<f32> = (0..classes).map(|c| output[[0, t, c]]).collect();
        let probs = if row.iter().all(|p| (0.0..=1.0).contains(p)) {
            row
        } else {
            softmax(&row)
        };

        let (max_idx, max_prob) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (i, p)| {
                if p > best.1 {
                    (i, p)
                } else {
                    best
                }
            });

        // Skip blank (index 0) and collapse repeats
        if max_idx > 0 && max_idx != prev_idx {
            if let Some(ch) = vocab.get(max_idx - 1) {
                text.push(*ch);
                scores.push(max_prob);
            }
        }
        prev_idx = max_idx;
    }

    let confidence = if scores.is_empty() {
        0.0
    } else {
        (scores.iter().sum::<f32>() / scores.len() as f32).clamp(0.0, 1.0)
    };

    Ok((text, confidence))
}

fn softmax(row: &[f32]) -> Vec<f32> {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = row.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}
