//! Grad-CAM saliency.
//!
//! A [`GradCam`] engine is built per request. During the forward pass it
//! intercepts the target convolution's output, keeps it as the activation
//! snapshot and re-roots it as a gradient-tracked leaf. The backward pass
//! seeded at the predicted class then yields the gradient snapshot at that
//! leaf. Both snapshots live inside the engine, which `explain` consumes.

use burn::prelude::*;
use burn::tensor::activation::relu;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;

use super::InferenceError;
use crate::classifier::{Classifier, ForwardHook, LayerInfo};

/// Single-channel importance grid, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct SaliencyMap {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl SaliencyMap {
    pub fn new(width: usize, height: usize, values: Vec<f32>) -> Result<Self, InferenceError> {
        if values.len() != width * height {
            return Err(InferenceError::Runtime(format!(
                "saliency map of {width}x{height} needs {} values, got {}",
                width * height,
                values.len()
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x]
    }

    /// Shift so the minimum is 0, then scale so the maximum is 1.
    /// An all-equal map becomes all zeros.
    pub fn normalize(mut self) -> Self {
        let min = self.values.iter().copied().fold(f32::INFINITY, f32::min);
        if min.is_finite() {
            self.values.iter_mut().for_each(|v| *v -= min);
        }
        let max = self.values.iter().copied().fold(0.0f32, f32::max);
        let divisor = if max > 0.0 { max } else { 1.0 };
        self.values.iter_mut().for_each(|v| *v /= divisor);
        self
    }
}

/// Outcome of one Grad-CAM pass.
#[derive(Debug, Clone)]
pub struct Explanation {
    pub saliency: SaliencyMap,
    pub class_index: usize,
    /// Softmax probability of `class_index`, in [0, 1].
    pub confidence: f32,
}

/// Grad-CAM engine bound to one target layer. Single use.
pub struct GradCam<B: AutodiffBackend> {
    target_layer: String,
    activation: Option<Tensor<B, 4>>,
}

impl<B: AutodiffBackend> GradCam<B> {
    pub fn new(target_layer: &LayerInfo) -> Self {
        Self::for_layer(target_layer.path.clone())
    }

    pub fn for_layer(path: impl Into<String>) -> Self {
        Self {
            target_layer: path.into(),
            activation: None,
        }
    }

    pub fn target_layer(&self) -> &str {
        &self.target_layer
    }

    /// Classify `input` (batch of one) and explain the predicted class.
    pub fn explain<M: Classifier<B>>(
        mut self,
        model: &M,
        input: Tensor<B, 4>,
    ) -> Result<Explanation, InferenceError> {
        let logits = model.forward_hooked(input, &mut self);
        let activation = self.activation.take().ok_or_else(|| {
            InferenceError::Runtime(format!(
                "target layer {} was not executed in the forward pass",
                self.target_layer
            ))
        })?;

        let [_, classes] = logits.dims();
        let scores = read_values(logits.clone())?;
        let scores = &scores[..classes];
        let probabilities = softmax(scores);
        let class_index = argmax(scores);
        let confidence = probabilities[class_index];

        let mut seed = vec![0.0f32; classes];
        seed[class_index] = 1.0;
        let one_hot =
            Tensor::<B, 2>::from_data(TensorData::new(seed, [1, classes]), &logits.device());

        let grads = (logits.narrow(0, 0, 1) * one_hot).sum().backward();
        let gradient = activation.grad(&grads).ok_or_else(|| {
            InferenceError::Runtime(format!(
                "no gradient reached target layer {}",
                self.target_layer
            ))
        })?;

        let map = grad_cam_map(activation.inner(), gradient);
        let [height, width] = map.dims();
        let saliency = SaliencyMap::new(width, height, read_values(map)?)?.normalize();

        Ok(Explanation {
            saliency,
            class_index,
            confidence,
        })
    }
}

impl<B: AutodiffBackend> ForwardHook<B> for GradCam<B> {
    fn on_conv_output(&mut self, layer: &str, output: Tensor<B, 4>) -> Tensor<B, 4> {
        if layer != self.target_layer {
            return output;
        }
        let leaf = output.detach().require_grad();
        self.activation = Some(leaf.clone());
        leaf
    }
}

/// Un-normalised Grad-CAM for the first batch item:
/// `relu(Σ_c mean_hw(gradient[c]) · activation[c])`, shape `(H, W)`.
pub fn grad_cam_map<B: Backend>(activation: Tensor<B, 4>, gradient: Tensor<B, 4>) -> Tensor<B, 2> {
    let [_, channels, height, width] = activation.dims();
    let activation = activation.narrow(0, 0, 1);
    let weights = gradient.narrow(0, 0, 1).mean_dim(3).mean_dim(2);
    debug_assert_eq!(weights.dims(), [1, channels, 1, 1]);

    let map = (activation * weights).sum_dim(1);
    relu(map).reshape([height, width])
}

/// Numerically stable softmax.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Index of the largest score; the first one wins on ties.
pub fn argmax(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_score), (i, &s)| {
            if s > best_score {
                (i, s)
            } else {
                (best, best_score)
            }
        })
        .0
}

fn read_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>, InferenceError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| InferenceError::Runtime(format!("cannot read tensor values: {e:?}")))
}
