//! Per-request inference pipeline: decode → preprocess → Grad-CAM →
//! overlay compositing.

pub mod colormap;
pub mod overlay;
pub mod predictor;
pub mod preprocess;
pub mod saliency;

pub use overlay::{decode_png_base64, encode_png_base64, visualize, EncodedImages};
pub use predictor::{DiagnosisService, PredictionReport, PredictionResult, Predictor};
pub use preprocess::{decode_image, preprocess};
pub use saliency::{Explanation, GradCam, SaliencyMap};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Cannot decode image: {0}")]
    Decode(String),

    #[error("Inference failed: {0}")]
    Runtime(String),
}
