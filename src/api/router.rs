//! HTTP router.
//!
//! - `GET /`              single-page frontend
//! - `GET /static/*`      files under the static directory
//! - `POST /api/predict`  multipart image upload → diagnosis + overlay
//! - `GET /api/health`    liveness and model info

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::config::{MAX_UPLOAD_BYTES, MULTIPART_OVERHEAD_BYTES};

/// Build the service router.
pub fn api_router(ctx: ApiContext) -> Router {
    let static_files = ServeDir::new(&ctx.static_dir);

    let api = Router::new()
        .route("/predict", post(endpoints::predict::predict))
        .route("/health", get(endpoints::health::check))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD_BYTES));

    Router::new()
        .route("/", get(endpoints::frontend::index))
        .nest("/api", api)
        .nest_service("/static", static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
