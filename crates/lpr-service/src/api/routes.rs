use crate::error::ApiError;
use crate::state::LprServiceState;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::plates::{HealthResponse, RecognitionResponse};
use common::validation::{
    payload_too_large_message, validate_image_extension, validate_non_empty_payload,
    validate_payload_size, ALLOWED_EXTENSIONS,
};
use std::time::Instant;
use telemetry::metrics::LPR_REQUESTS;

/// Multipart field carrying the image
const FILE_FIELD: &str = "file";

/// Upload an image and recognize the license plates in it
pub async fn recognize(
    State(state): State<LprServiceState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RecognitionResponse>, ApiError> {
    let start = Instant::now();

    let result = recognize_upload(&state, multipart, start).await;
    let status = match &result {
        Ok(Json(response)) if response.detections.is_empty() => "empty",
        Ok(_) => "success",
        Err(ApiError::BadRequest(_)) => "rejected",
        Err(ApiError::ServiceUnavailable(_)) => "unavailable",
        Err(ApiError::Internal(_)) => "error",
    };
    LPR_REQUESTS.with_label_values(&[status]).inc();

    match &result {
        Err(ApiError::Internal(detail)) => {
            tracing::error!(error = %detail, "Error processing image")
        }
        Err(e) => tracing::warn!(error = %e, "Recognition request failed"),
        Ok(_) => {}
    }

    result
}

async fn recognize_upload(
    state: &LprServiceState,
    multipart: Result<Multipart, MultipartRejection>,
    start: Instant,
) -> Result<Json<RecognitionResponse>, ApiError> {
    let max_bytes = state.config().max_image_bytes;
    let mut multipart = multipart
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart upload: {}", e.body_text())))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        validate_image_extension(&filename, ALLOWED_EXTENSIONS)
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, max_bytes))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload
        .ok_or_else(|| ApiError::bad_request(format!("Missing '{}' field", FILE_FIELD)))?;

    validate_payload_size(bytes.len(), max_bytes)
        .and_then(|_| validate_non_empty_payload(bytes.len()))
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    tracing::debug!(filename = %filename, size = bytes.len(), "Received image");

    let plates = state.recognize(bytes.to_vec()).await?;
    let processing_time = start.elapsed().as_secs_f64();

    Ok(Json(RecognitionResponse::from_detections(
        plates,
        processing_time,
    )))
}

fn multipart_error(err: axum::extract::multipart::MultipartError, max_bytes: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::bad_request(payload_too_large_message(max_bytes))
    } else {
        ApiError::bad_request(format!("Invalid multipart upload: {}", err.body_text()))
    }
}

/// Readiness of the two models; always 200
pub async fn health(State(state): State<LprServiceState>) -> Json<HealthResponse> {
    Json(state.health())
}

/// Prometheus metrics endpoint
pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}
