//! ONNX Runtime session construction shared by the detector and recognizer
use anyhow::{bail, Context, Result};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
};
use std::path::Path;

/// Session tuning shared by both models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Try the CUDA execution provider before CPU
    pub use_gpu: bool,

    /// GPU device ID
    pub device_id: i32,

    /// Number of intra-operation threads
    pub intra_threads: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            use_gpu: false,
            device_id: 0,
            intra_threads: 4,
        }
    }
}

/// Load `model_path`, returning the session and the provider that serves it
pub fn create_session(model_path: &str, options: &SessionOptions) -> Result<(Session, String)> {
    if !Path::new(model_path).exists() {
        bail!("model file not found at {}", model_path);
    }

    if options.use_gpu {
        try_cuda(model_path, options)
    } else {
        try_cpu(model_path, options)
    }
}

fn try_cuda(model_path: &str, options: &SessionOptions) -> Result<(Session, String)> {
    tracing::info!("Attempting CUDA for {}", model_path);
    let result = Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(options.intra_threads)
        .context("Failed to set intra threads")?
        .with_execution_providers([
            CUDAExecutionProvider::default()
                .with_device_id(options.device_id)
                .build(),
            CPUExecutionProvider::default().build(),
        ])
        .context("Failed to set execution providers")?
        .commit_from_file(model_path);

    match result {
        Ok(session) => {
            tracing::info!("CUDA configured for {}", model_path);
            Ok((session, "CUDA".to_string()))
        }
        Err(e) => {
            tracing::warn!("CUDA failed, using CPU: {}", e);
            try_cpu(model_path, options)
        }
    }
}

fn try_cpu(model_path: &str, options: &SessionOptions) -> Result<(Session, String)> {
    tracing::info!("Using CPU for {}", model_path);
    let session = Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(options.intra_threads)
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .context("Failed to load model from file")?;
    Ok((session, "CPU".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_reported_before_runtime() {
        let err = match create_session("models/does-not-exist.onnx", &SessionOptions::default()) {
            Ok(_) => panic!("expected a missing model error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("model file not found"));
    }
}
