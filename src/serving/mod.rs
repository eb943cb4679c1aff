//! HTTP prediction service

pub mod process;
pub mod routes;

pub use process::{HealthReport, Lifecycle, ServingError, ServingProcess};

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the service router over a shared serving process
pub fn router(process: Arc<ServingProcess>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/predict", post(routes::predict))
        .route("/metrics", get(routes::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(process)
}
