use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Multipart framing on top of the image itself
    let upload_limit = state.config.max_upload_size as usize + 64 * 1024;

    let mut router = Router::new()
        // Images
        .route("/api/v1/images", get(handlers::list_images))
        .route(
            "/api/v1/images",
            post(handlers::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/v1/images/:img_id", get(handlers::get_image_status))
        .route("/api/v1/images/:img_id/process", post(handlers::process_image))
        .route(
            "/api/v1/images/:img_id/matches",
            get(handlers::get_image_matches),
        )
        // Internal
        .route(
            "/_internal/images/:img_id/requeue",
            post(handlers::requeue_image),
        )
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled: purge route is available.");
        router = router.route("/admin/purge", delete(handlers::admin_purge));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
