//! Single-page frontend.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use crate::api::types::ApiContext;

/// `GET /`: `index.html` from the static directory, read per request.
pub async fn index(State(ctx): State<ApiContext>) -> Response {
    let path = ctx.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "Frontend unavailable: {e}");
            (StatusCode::NOT_FOUND, "index.html not found").into_response()
        }
    }
}
