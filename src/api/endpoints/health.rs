//! Health check endpoint.

use axum::extract::State;
use axum::Json;

use crate::api::types::{ApiContext, HealthResponse};

/// `GET /api/health`: liveness plus the loaded model and Grad-CAM layer.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: crate::config::APP_VERSION.into(),
        model: ctx.service.model_name().to_string(),
        target_layer: ctx.service.target_layer().to_string(),
        started_at: ctx.started_at.to_rfc3339(),
    })
}
