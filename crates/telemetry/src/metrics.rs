use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Request Metrics ====
    pub static ref LPR_REQUESTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "lpr_requests_total",
                "Total number of recognition requests by outcome",
            ),
            &["status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_PIPELINE_LATENCY: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "lpr_pipeline_latency_seconds",
                "End-to-end latency of a recognition pipeline run",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Pipeline Metrics ====
    pub static ref LPR_CANDIDATES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "lpr_candidates_total",
                "Detector candidates by per-candidate outcome",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_OCR_FALLBACKS: IntCounter = {
        let metric = IntCounter::new(
            "lpr_ocr_fallbacks_total",
            "Recognition retries on the unenhanced crop",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_STAGE_LATENCY: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "lpr_stage_latency_seconds",
                "Latency of individual pipeline stages",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0]),
            &["stage"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Model and Worker Metrics ====
    pub static ref LPR_MODEL_LOADED: IntGaugeVec = {
        let metric = IntGaugeVec::new(
            Opts::new(
                "lpr_model_loaded",
                "Model load state (1=loaded, 0=not loaded)",
            ),
            &["model"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_INFERENCE_IN_FLIGHT: IntGauge = {
        let metric = IntGauge::new(
            "lpr_inference_in_flight",
            "Pipeline runs currently occupying an inference worker",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_metrics_accessible() {
        let before = LPR_REQUESTS.with_label_values(&["success"]).get();
        LPR_REQUESTS.with_label_values(&["success"]).inc();
        assert_eq!(LPR_REQUESTS.with_label_values(&["success"]).get(), before + 1);
    }

    #[test]
    fn test_model_gauge_accessible() {
        LPR_MODEL_LOADED.with_label_values(&["detector"]).set(1);
        assert_eq!(LPR_MODEL_LOADED.with_label_values(&["detector"]).get(), 1);
    }

    #[test]
    fn test_encode_metrics_succeeds() {
        LPR_OCR_FALLBACKS.inc();
        let encoded = encode_metrics().expect("metrics should encode");
        assert!(encoded.contains("lpr_ocr_fallbacks_total"));
    }
}
