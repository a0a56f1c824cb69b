//! One upload in, one diagnosis with its explanation out.
//!
//! The classifier sits behind a `Mutex`. Each prediction builds its own
//! [`GradCam`] engine and runs the forward and backward pass while holding
//! the lock, so hook state is never shared between requests. Decoding and
//! compositing run outside the lock.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;

use super::overlay::visualize;
use super::preprocess::{decode_image, preprocess};
use super::saliency::{GradCam, SaliencyMap};
use super::InferenceError;
use crate::classifier::{
    find_target_layer, load_classifier, Classifier, EfficientNet, EfficientNetConfig, LayerInfo,
    ModelError,
};
use crate::diagnosis::Diagnosis;

/// Classification of one image.
#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub diagnosis: Diagnosis,
    /// Softmax probability of `diagnosis`, in [0, 1].
    pub confidence: f32,
    pub saliency: SaliencyMap,
}

impl PredictionResult {
    pub fn color(&self) -> &'static str {
        self.diagnosis.color()
    }
}

/// Prediction plus the images returned to the client.
#[derive(Debug, Clone)]
pub struct PredictionReport {
    pub result: PredictionResult,
    pub original_png_b64: String,
    pub overlay_png_b64: String,
}

/// What the HTTP layer needs from the inference side.
pub trait DiagnosisService: Send + Sync {
    /// Diagnose an uploaded image (any format the decoder supports).
    fn predict(&self, image_bytes: &[u8]) -> Result<PredictionReport, InferenceError>;

    /// Human-readable model description.
    fn model_name(&self) -> &str;

    /// Module path of the Grad-CAM target layer.
    fn target_layer(&self) -> &str;
}

pub struct Predictor<B: AutodiffBackend, M: Classifier<B>> {
    model: Mutex<M>,
    target_layer: LayerInfo,
    device: B::Device,
    model_name: String,
}

impl<B: AutodiffBackend, M: Classifier<B>> Predictor<B, M> {
    /// Wrap a loaded classifier. Fails if it has no convolution to explain.
    pub fn new(model: M, device: B::Device, model_name: impl Into<String>) -> Result<Self, ModelError> {
        let layers = model.layers();
        let target_layer = find_target_layer(&layers)?.clone();

        tracing::info!(
            target_layer = %target_layer.path,
            layers = layers.len(),
            "Grad-CAM target layer selected"
        );

        Ok(Self {
            model: Mutex::new(model),
            target_layer,
            device,
            model_name: model_name.into(),
        })
    }

    pub fn target(&self) -> &LayerInfo {
        &self.target_layer
    }

    /// Decode → preprocess → Grad-CAM (under the lock) → composite.
    pub fn run(&self, image_bytes: &[u8]) -> Result<PredictionReport, InferenceError> {
        let started = Instant::now();
        let image = decode_image(image_bytes)?;
        let input = preprocess::<B>(&image, &self.device);

        let explanation = {
            let model = self
                .model
                .lock()
                .map_err(|_| InferenceError::Runtime("classifier lock poisoned".into()))?;
            GradCam::new(&self.target_layer).explain(&*model, input)?
        };

        let diagnosis = Diagnosis::from_index(explanation.class_index).ok_or_else(|| {
            InferenceError::Runtime(format!(
                "classifier produced class index {} outside the label set",
                explanation.class_index
            ))
        })?;

        let images = visualize(&image, &explanation.saliency)?;

        tracing::info!(
            diagnosis = %diagnosis,
            confidence = explanation.confidence,
            width = image.width(),
            height = image.height(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Prediction complete"
        );

        Ok(PredictionReport {
            result: PredictionResult {
                diagnosis,
                confidence: explanation.confidence,
                saliency: explanation.saliency,
            },
            original_png_b64: images.original_png_b64,
            overlay_png_b64: images.overlay_png_b64,
        })
    }
}

impl<B: AutodiffBackend> Predictor<B, EfficientNet<B>> {
    /// Load an EfficientNet-B0 checkpoint with one output per diagnosis.
    pub fn load(checkpoint: &Path, device: B::Device) -> Result<Self, ModelError> {
        let config = EfficientNetConfig::default();
        let model = load_classifier::<B>(checkpoint, &config, &device)?;
        let name = format!(
            "efficientnet_b0 ({})",
            checkpoint
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| checkpoint.display().to_string())
        );
        Self::new(model, device, name)
    }
}

impl<B: AutodiffBackend, M: Classifier<B>> DiagnosisService for Predictor<B, M> {
    fn predict(&self, image_bytes: &[u8]) -> Result<PredictionReport, InferenceError> {
        self.run(image_bytes)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn target_layer(&self) -> &str {
        &self.target_layer.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{save_classifier, InferenceBackend};
    use crate::pipeline::overlay::decode_png_base64;
    use burn::module::Module;
    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::Arc;

    type TestPredictor = Predictor<InferenceBackend, EfficientNet<InferenceBackend>>;

    fn tiny_predictor() -> TestPredictor {
        let device = Default::default();
        let model = EfficientNetConfig::new(0.25, 0.25, 3)
            .init::<InferenceBackend>(&device)
            .no_grad();
        Predictor::new(model, device, "tiny").unwrap()
    }

    fn png(img: RgbImage) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    fn gradient_image(seed: u32) -> Vec<u8> {
        png(RgbImage::from_fn(96, 80, |x, y| {
            Rgb([
                ((x * seed) % 256) as u8,
                ((y * 3 + seed) % 256) as u8,
                ((x + y) % 256) as u8,
            ])
        }))
    }

    #[test]
    fn predicts_label_from_fixed_set() {
        let predictor = tiny_predictor();
        let report = predictor.run(&gradient_image(7)).unwrap();

        assert!(Diagnosis::ALL.contains(&report.result.diagnosis));
        assert!((0.0..=1.0).contains(&report.result.confidence));
        assert_eq!(report.result.color(), report.result.diagnosis.color());
        assert_eq!(predictor.target_layer(), "head.conv");
    }

    #[test]
    fn images_keep_original_dimensions() {
        let predictor = tiny_predictor();
        let report = predictor.run(&gradient_image(3)).unwrap();

        let original = decode_png_base64(&report.original_png_b64).unwrap();
        let overlay = decode_png_base64(&report.overlay_png_b64).unwrap();
        assert_eq!(original.dimensions(), (96, 80));
        assert_eq!(overlay.dimensions(), (96, 80));
    }

    #[test]
    fn corrupt_upload_is_decode_error() {
        let predictor = tiny_predictor();
        let err = predictor.run(b"GIF89a but not really").unwrap_err();
        assert!(matches!(err, InferenceError::Decode(_)));
    }

    #[test]
    fn concurrent_predictions_match_sequential_results() {
        let predictor = Arc::new(tiny_predictor());
        let inputs = [gradient_image(5), gradient_image(11)];

        let sequential: Vec<_> = inputs
            .iter()
            .map(|bytes| predictor.run(bytes).unwrap())
            .collect();

        let handles: Vec<_> = inputs
            .iter()
            .cloned()
            .map(|bytes| {
                let predictor = Arc::clone(&predictor);
                std::thread::spawn(move || predictor.run(&bytes).unwrap())
            })
            .collect();
        let concurrent: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for (seq, conc) in sequential.iter().zip(&concurrent) {
            assert_eq!(seq.result.diagnosis, conc.result.diagnosis);
            assert_eq!(seq.result.confidence, conc.result.confidence);
            assert_eq!(seq.result.saliency, conc.result.saliency);
            assert_eq!(seq.overlay_png_b64, conc.overlay_png_b64);
        }
    }

    #[test]
    fn load_requires_three_class_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let four = EfficientNetConfig::new(1.0, 1.0, 4).init::<InferenceBackend>(&device);
        let path = save_classifier(&four, &dir.path().join("four.mpk")).unwrap();

        let err = TestPredictor::load(&path, device).err().unwrap();
        assert!(matches!(err, ModelError::FatalLoad(_)));
    }

    #[test]
    fn load_missing_checkpoint_fails() {
        let err = TestPredictor::load(Path::new("/nonexistent/ROP_model.pth"), Default::default())
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::FatalLoad(_)));
    }
}
