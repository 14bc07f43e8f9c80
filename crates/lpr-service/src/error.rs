use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::plates::ErrorResponse;
use thiserror::Error;

/// Message returned for any failure whose details stay server-side
pub const GENERIC_FAILURE_MESSAGE: &str = "An error occurred while processing the image";

/// Message returned while the models are missing
pub const MODELS_UNAVAILABLE_MESSAGE: &str = "License plate models are not loaded";

/// Which external model a failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Detector,
    Recognizer,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Detector => "detector",
            ModelKind::Recognizer => "recognizer",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of a recognition run or of model initialization.
///
/// Only stages shared by all candidates (decode, detect) and startup produce
/// these; per-candidate failures are absorbed by the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("license plate detection failed: {0}")]
    Detection(String),

    #[error("failed to load {model} model: {reason}")]
    ModelLoad { model: ModelKind, reason: String },

    #[error("{0} model is not loaded")]
    ModelUnavailable(ModelKind),

    #[error("internal pipeline failure: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn model_load(model: ModelKind, err: impl std::fmt::Display) -> Self {
        Self::ModelLoad {
            model,
            reason: format!("{:#}", err),
        }
    }
}

/// Errors rendered to HTTP clients as the structured error envelope
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest(msg) => ErrorResponse::new(msg, Some("bad_request")),
            ApiError::ServiceUnavailable(msg) => {
                ErrorResponse::new(msg, Some("service_unavailable"))
            }
            // Internal details are logged by the caller, never returned
            ApiError::Internal(_) => {
                ErrorResponse::new(GENERIC_FAILURE_MESSAGE, Some("internal_error"))
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Decode(_) => ApiError::bad_request(err.to_string()),
            PipelineError::ModelUnavailable(_) | PipelineError::ModelLoad { .. } => {
                ApiError::unavailable(MODELS_UNAVAILABLE_MESSAGE)
            }
            PipelineError::Detection(_) | PipelineError::Internal(_) => {
                ApiError::internal(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(format!("{:#}", err))
    }
}
