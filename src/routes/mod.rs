pub mod error;
pub mod health;
pub mod medicine;
pub mod metrics;
pub mod scan;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Multipart framing on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// API routes. `/metrics` is added by the binary.
pub fn router(state: AppState) -> Router {
    let body_limit = state.scans.ingress().max_image_bytes() + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/scan", axum::routing::post(scan::submit_scan))
        .route(
            "/scan/{request_id}",
            get(scan::get_scan_status).delete(scan::cancel_scan),
        )
        .route("/medicine/{medicine_id}", get(medicine::get_medicine))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Tracing, compression and CORS around the whole app.
///
/// The only body limit is the router's `DefaultBodyLimit`, so oversized
/// uploads still get a JSON error body.
pub fn with_http_layers(app: Router) -> Router {
    app.layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
