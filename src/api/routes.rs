use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Room for multipart boundaries and part headers on top of the image itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.server.max_upload_size as usize + MULTIPART_OVERHEAD;

    let mut router = Router::new()
        // Images
        .route("/images", get(handlers::list_images))
        .route(
            "/images",
            post(handlers::create_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/images/:id", delete(handlers::delete_image))
        .route("/images/:id", get(handlers::get_image))
        // Internal
        .route("/health", get(handlers::health));

    // Locally hosted assets
    if state.local_assets.is_some() {
        router = router.route("/assets/*asset_ref", get(handlers::serve_asset));
    }

    router = router.layer(TraceLayer::new_for_http());

    if let Some(origin) = state.config.server.cors_origin.as_deref() {
        match origin.parse::<HeaderValue>() {
            Ok(origin) => {
                router = router.layer(
                    CorsLayer::new()
                        .allow_origin(origin)
                        .allow_methods(Any)
                        .allow_headers(Any),
                );
            }
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS_ORIGIN");
            }
        }
    }

    router.with_state(state)
}
