use crate::api::{handlers, AppState};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.server.max_upload_bytes;

    Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Predictions
        .route("/predict-file", post(handlers::predict_file))
        .route("/predict-form", post(handlers::predict_form))
        // Alerts
        .route("/notify", post(handlers::notify))
        // Metadata
        .route("/model-info", get(handlers::model_info))
        .route("/upload-history", get(handlers::upload_history))
        .fallback(handlers::not_found)
        // Add state
        .with_state(state)
        // Add middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
