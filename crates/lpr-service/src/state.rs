use crate::capability::{ModelLoader, ObjectDetector, TextRecognizer};
use crate::config::LprServiceConfig;
use crate::error::{ModelKind, PipelineError};
use crate::pipeline::DetectionPipeline;
use crate::pool::InferencePool;
use crate::readiness::ServiceReadiness;
use anyhow::Result;
use common::plates::{HealthResponse, RecognizedPlate};
use std::sync::Arc;
use telemetry::metrics::LPR_MODEL_LOADED;
use tokio::sync::OnceCell;
use tracing::{error, info};

type LoadOutcome = (
    Result<Arc<dyn ObjectDetector>>,
    Result<Arc<dyn TextRecognizer>>,
);

#[derive(Clone)]
pub struct LprServiceState {
    inner: Arc<LprServiceStateInner>,
}

struct LprServiceStateInner {
    config: LprServiceConfig,
    readiness: ServiceReadiness,
    /// Set once by `initialize`; `None` when a model failed to load
    pipeline: OnceCell<Option<Arc<DetectionPipeline>>>,
    pool: InferencePool,
}

impl LprServiceState {
    pub fn new(config: LprServiceConfig) -> Self {
        let pool = InferencePool::new(config.inference_workers);
        Self {
            inner: Arc::new(LprServiceStateInner {
                config,
                readiness: ServiceReadiness::new(),
                pipeline: OnceCell::new(),
                pool,
            }),
        }
    }

    pub fn config(&self) -> &LprServiceConfig {
        &self.inner.config
    }

    pub fn readiness(&self) -> &ServiceReadiness {
        &self.inner.readiness
    }

    pub fn health(&self) -> HealthResponse {
        self.inner.readiness.snapshot()
    }

    /// Whether model loading has completed, successfully or not
    pub fn is_initialized(&self) -> bool {
        self.inner.pipeline.initialized()
    }

    /// Load both models exactly once.
    ///
    /// Concurrent callers wait on the same load. A failed load is kept: the
    /// service stays degraded and later calls do not retry. Returns whether
    /// the pipeline is available.
    pub async fn initialize(&self, loader: Arc<dyn ModelLoader>) -> bool {
        let pipeline = self
            .inner
            .pipeline
            .get_or_init(|| self.load_pipeline(loader))
            .await;
        pipeline.is_some()
    }

    async fn load_pipeline(&self, loader: Arc<dyn ModelLoader>) -> Option<Arc<DetectionPipeline>> {
        info!("Loading license plate models...");

        let outcome = self
            .inner
            .pool
            .run(move || -> Result<LoadOutcome, PipelineError> {
                Ok((loader.load_detector(), loader.load_recognizer()))
            })
            .await;

        let (detector, recognizer) = match outcome {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(error = %e, "Model loading aborted");
                return None;
            }
        };

        let detector = self.record_load(ModelKind::Detector, detector);
        let recognizer = self.record_load(ModelKind::Recognizer, recognizer);

        match (detector, recognizer) {
            (Some(detector), Some(recognizer)) => {
                info!(
                    detector = detector.id(),
                    recognizer = recognizer.id(),
                    "License plate models loaded"
                );
                Some(Arc::new(DetectionPipeline::new(
                    detector,
                    recognizer,
                    self.inner.config.thresholds(),
                )))
            }
            _ => {
                error!("License plate models unavailable, service is degraded");
                None
            }
        }
    }

    fn record_load<T>(&self, model: ModelKind, result: Result<T>) -> Option<T> {
        match result {
            Ok(loaded) => {
                self.inner.readiness.mark_loaded(model);
                Some(loaded)
            }
            Err(e) => {
                LPR_MODEL_LOADED.with_label_values(&[model.as_str()]).set(0);
                error!(error = %PipelineError::model_load(model, &e), "Model load failed");
                None
            }
        }
    }

    pub fn pipeline(&self) -> Option<Arc<DetectionPipeline>> {
        self.inner.pipeline.get().and_then(|p| p.clone())
    }

    /// Run one image through the pipeline on the inference pool
    pub async fn recognize(&self, image_bytes: Vec<u8>) -> Result<Vec<RecognizedPlate>, PipelineError> {
        let pipeline = self.pipeline().ok_or_else(|| self.missing_model())?;
        self.inner
            .pool
            .run(move || pipeline.run(&image_bytes))
            .await
    }

    fn missing_model(&self) -> PipelineError {
        if self.inner.readiness.detector_loaded() {
            PipelineError::ModelUnavailable(ModelKind::Recognizer)
        } else {
            PipelineError::ModelUnavailable(ModelKind::Detector)
        }
    }
}
