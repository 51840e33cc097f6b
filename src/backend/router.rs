use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use super::api::queue_api;
use crate::manager::QueueManager;

async fn healthz() -> &'static str {
    "ok"
}

/// Create the main backend router
pub fn create_router(manager: Arc<QueueManager>) -> Router {
    let downloads = ServeDir::new(&manager.config().download_dir);
    Router::new()
        .route("/healthz", get(healthz))
        .merge(queue_api())
        // finished files
        .nest_service("/downloads", downloads)
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}
