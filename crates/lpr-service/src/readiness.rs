//! Load state of the two models, as seen by the health endpoint
use crate::error::ModelKind;
use common::plates::HealthResponse;
use std::sync::atomic::{AtomicBool, Ordering};
use telemetry::metrics::LPR_MODEL_LOADED;

/// Readiness flags, raised at most once and never lowered
#[derive(Debug, Default)]
pub struct ServiceReadiness {
    detector_loaded: AtomicBool,
    recognizer_loaded: AtomicBool,
}

impl ServiceReadiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful load of `model`.
    ///
    /// Returns false when the flag was already raised.
    pub fn mark_loaded(&self, model: ModelKind) -> bool {
        let flag = match model {
            ModelKind::Detector => &self.detector_loaded,
            ModelKind::Recognizer => &self.recognizer_loaded,
        };

        let first = flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            LPR_MODEL_LOADED.with_label_values(&[model.as_str()]).set(1);
        }
        first
    }

    pub fn detector_loaded(&self) -> bool {
        self.detector_loaded.load(Ordering::Acquire)
    }

    pub fn recognizer_loaded(&self) -> bool {
        self.recognizer_loaded.load(Ordering::Acquire)
    }

    pub fn is_ready(&self) -> bool {
        self.detector_loaded() && self.recognizer_loaded()
    }

    pub fn snapshot(&self) -> HealthResponse {
        HealthResponse::from_flags(self.detector_loaded(), self.recognizer_loaded())
    }
}
