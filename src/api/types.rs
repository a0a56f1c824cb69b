//! Shared state and response bodies for the HTTP layer.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnosis::Diagnosis;
use crate::pipeline::{DiagnosisService, PredictionReport};

// ═══════════════════════════════════════════════════════════
// API context
// ═══════════════════════════════════════════════════════════

/// Shared context for all routes.
#[derive(Clone)]
pub struct ApiContext {
    pub service: Arc<dyn DiagnosisService>,
    pub static_dir: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl ApiContext {
    pub fn new(service: Arc<dyn DiagnosisService>, static_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            static_dir: static_dir.into(),
            started_at: Utc::now(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Response bodies
// ═══════════════════════════════════════════════════════════

/// `POST /api/predict` success body.
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub success: bool,
    pub diagnosis: String,
    /// Percentage, two decimals.
    pub confidence: f64,
    pub color: String,
    /// Base64 PNG of the uploaded image.
    pub original_image: String,
    /// Base64 PNG of the Grad-CAM heatmap blended over the image.
    pub heatmap_overlay: String,
}

impl PredictResponse {
    pub fn from_report(report: PredictionReport) -> Self {
        let diagnosis: Diagnosis = report.result.diagnosis;
        Self {
            success: true,
            diagnosis: diagnosis.as_str().to_string(),
            confidence: confidence_percent(report.result.confidence),
            color: diagnosis.color().to_string(),
            original_image: report.original_png_b64,
            heatmap_overlay: report.overlay_png_b64,
        }
    }
}

/// Failure body shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// `GET /api/health` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: String,
    pub target_layer: String,
    /// RFC 3339 timestamp of router construction.
    pub started_at: String,
}

/// Probability in [0, 1] → percentage rounded to two decimals.
pub fn confidence_percent(probability: f32) -> f64 {
    (f64::from(probability) * 100.0 * 100.0).round() / 100.0
}
