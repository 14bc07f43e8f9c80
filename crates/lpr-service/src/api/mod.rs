pub mod routes;

use crate::state::LprServiceState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Room for multipart boundaries and headers on top of the image itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the API router
pub fn router(state: LprServiceState) -> Router {
    let body_limit = state.config().max_image_bytes + MULTIPART_OVERHEAD;

    Router::new()
        // Health and metrics endpoints
        .route("/api/v1/health", get(routes::health))
        .route("/api/v1/health/", get(routes::health))
        .route("/metrics", get(routes::metrics))
        // Recognition
        .route("/api/v1/license-plate/recognize", post(routes::recognize))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
