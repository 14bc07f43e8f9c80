/// Integration tests for the plate detection and recognition pipeline
use common::plates::{BoundingBox, Detection, RecognitionResponse, RecognizedSpan};
use image::{ImageFormat, Rgb, RgbImage};
use lpr_service::capability::mock::{ScriptedRecognizer, StaticDetector};
use lpr_service::capability::DetectionThresholds;
use lpr_service::pipeline::normalize_plate_text;
use lpr_service::{DetectionPipeline, PipelineError};
use std::io::Cursor;
use std::sync::Arc;

/// Light gray frame with a dark rectangle where a plate would be
fn test_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        if (20..120).contains(&x) && (40..70).contains(&y) {
            Rgb([30, 30, 30])
        } else {
            Rgb([200, 200, 200])
        }
    });

    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn candidate(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Detection {
    Detection::new(BoundingBox::new(x1, y1, x2, y2), confidence)
}

fn build(detections: Vec<Detection>, recognizer: Arc<ScriptedRecognizer>) -> DetectionPipeline {
    DetectionPipeline::new(
        Arc::new(StaticDetector::new(detections)),
        recognizer,
        DetectionThresholds::default(),
    )
}

#[test]
fn test_no_candidates_yields_informational_response() {
    let pipeline = build(vec![], Arc::new(ScriptedRecognizer::new()));

    let plates = pipeline.run(&test_image(160, 120, ImageFormat::Png)).unwrap();
    let response = RecognitionResponse::from_detections(plates, 0.01);

    assert!(response.success);
    assert!(response.detections.is_empty());
    assert!(response.message.starts_with("No license plates detected"));
}

#[test]
fn test_single_plate_fuses_confidence() {
    let recognizer = Arc::new(ScriptedRecognizer::constant(vec![
        RecognizedSpan::new("AB", 0.9),
        RecognizedSpan::new("1234", 0.7),
    ]));
    let pipeline = build(vec![candidate(20.0, 40.0, 120.0, 70.0, 0.8)], recognizer);

    let plates = pipeline.run(&test_image(160, 120, ImageFormat::Png)).unwrap();

    assert_eq!(plates.len(), 1);
    assert_eq!(plates[0].plate_number, "AB1234");
    assert!((plates[0].confidence - 0.8).abs() < 1e-6);
    assert_eq!(plates[0].bbox, BoundingBox::new(20.0, 40.0, 120.0, 70.0));
}

#[test]
fn test_lookalike_letters_in_suffix_are_corrected() {
    let recognizer = Arc::new(ScriptedRecognizer::constant(vec![RecognizedSpan::new(
        "AOB5", 0.6,
    )]));
    let pipeline = build(vec![candidate(20.0, 40.0, 120.0, 70.0, 0.9)], recognizer);

    let plates = pipeline.run(&test_image(160, 120, ImageFormat::Jpeg)).unwrap();
    assert_eq!(plates[0].plate_number, "AO85");
    assert!((plates[0].confidence - 0.75).abs() < 1e-6);
}

#[test]
fn test_unreadable_candidate_is_dropped_without_affecting_others() {
    let recognizer = Arc::new(
        ScriptedRecognizer::new()
            // First candidate: nothing on the enhanced or the raw crop
            .then_empty()
            .then_empty()
            // Second candidate
            .then(vec![RecognizedSpan::new("51F12345", 0.8)]),
    );
    let pipeline = build(
        vec![
            candidate(0.0, 0.0, 40.0, 20.0, 0.9),
            candidate(20.0, 40.0, 120.0, 70.0, 0.6),
        ],
        recognizer.clone(),
    );

    let plates = pipeline.run(&test_image(160, 120, ImageFormat::Png)).unwrap();

    assert_eq!(plates.len(), 1);
    assert_eq!(plates[0].plate_number, "51F12345");
    assert!((plates[0].confidence - 0.7).abs() < 1e-6);
    assert_eq!(recognizer.calls().len(), 3);
}

#[test]
fn test_degenerate_boxes_are_skipped() {
    let recognizer = Arc::new(ScriptedRecognizer::constant(vec![RecognizedSpan::new(
        "CD5678", 0.9,
    )]));
    let pipeline = build(
        vec![
            // Outside the image
            candidate(500.0, 500.0, 600.0, 550.0, 0.9),
            // Zero height after truncation
            candidate(10.0, 30.2, 90.0, 30.9, 0.9),
            candidate(20.0, 40.0, 120.0, 70.0, 0.9),
        ],
        recognizer.clone(),
    );

    let plates = pipeline.run(&test_image(160, 120, ImageFormat::Png)).unwrap();
    assert_eq!(plates.len(), 1);
    assert_eq!(recognizer.calls().len(), 1);
}

#[test]
fn test_results_follow_detector_order() {
    let recognizer = Arc::new(
        ScriptedRecognizer::new()
            .then(vec![RecognizedSpan::new("AA111", 0.9)])
            .then(vec![RecognizedSpan::new("BB222", 0.9)])
            .then(vec![RecognizedSpan::new("CC333", 0.9)]),
    );
    let pipeline = build(
        vec![
            candidate(100.0, 80.0, 150.0, 110.0, 0.4),
            candidate(0.0, 0.0, 50.0, 30.0, 0.95),
            candidate(50.0, 40.0, 100.0, 70.0, 0.7),
        ],
        recognizer,
    );

    let plates = pipeline.run(&test_image(160, 120, ImageFormat::Png)).unwrap();
    let numbers: Vec<&str> = plates.iter().map(|p| p.plate_number.as_str()).collect();
    assert_eq!(numbers, vec!["AA111", "BB222", "CC333"]);
}

#[test]
fn test_thresholds_are_pipeline_parameters() {
    let detector = Arc::new(StaticDetector::new(vec![
        candidate(0.0, 0.0, 50.0, 30.0, 0.3),
        candidate(50.0, 40.0, 100.0, 70.0, 0.7),
    ]));
    let pipeline = DetectionPipeline::new(
        detector,
        Arc::new(ScriptedRecognizer::constant(vec![RecognizedSpan::new(
            "EF9012", 0.9,
        )])),
        DetectionThresholds {
            confidence: 0.5,
            iou: 0.45,
        },
    );

    let plates = pipeline.run(&test_image(160, 120, ImageFormat::Png)).unwrap();
    assert_eq!(plates.len(), 1);
    assert_eq!(pipeline.thresholds().confidence, 0.5);
}

#[test]
fn test_output_invariants_hold() {
    let recognizer = Arc::new(ScriptedRecognizer::constant(vec![
        RecognizedSpan::new("XY", 1.0),
        RecognizedSpan::new("9876", 1.0),
    ]));
    let pipeline = build(
        vec![
            candidate(-30.0, -10.0, 60.0, 50.0, 1.0),
            candidate(140.0, 100.0, 400.0, 300.0, 0.99),
        ],
        recognizer,
    );

    let plates = pipeline.run(&test_image(160, 120, ImageFormat::Png)).unwrap();
    assert_eq!(plates.len(), 2);
    for plate in plates {
        assert!((0.0..=1.0).contains(&plate.confidence));
        assert!(plate.bbox.x1 <= plate.bbox.x2);
        assert!(plate.bbox.y1 <= plate.bbox.y2);
        assert!(plate.bbox.x1 >= 0.0 && plate.bbox.x2 <= 160.0);
        assert!(plate.bbox.y1 >= 0.0 && plate.bbox.y2 <= 120.0);
    }
}

#[test]
fn test_malformed_bytes_are_a_decode_error() {
    let pipeline = build(vec![], Arc::new(ScriptedRecognizer::new()));

    let mut truncated = test_image(160, 120, ImageFormat::Png);
    truncated.truncate(16);

    let err = pipeline.run(&truncated).unwrap_err();
    assert!(matches!(err, PipelineError::Decode(_)));
}

#[test]
fn test_normalizer_properties() {
    assert_eq!(normalize_plate_text(""), "");
    assert_eq!(normalize_plate_text("AB1"), "AB1");
    assert_eq!(normalize_plate_text("AOB5"), "AO85");

    for raw in ["29-a1 234.56", "zz ss oo", "B I Z", "  ab-cd  "] {
        let once = normalize_plate_text(raw);
        assert_eq!(normalize_plate_text(&once), once);
    }
}
