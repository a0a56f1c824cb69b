//! Frozen convolutional classifier: EfficientNet backbone, layer inspection,
//! forward hooks and checkpoint loading.
//!
//! The backbone is built with burn modules and loaded once at start. Every
//! convolution output is offered to a [`ForwardHook`], which is how the
//! saliency engine observes the target layer without changing the graph.

pub mod checkpoint;
pub mod efficientnet;
pub mod layers;

pub use checkpoint::{load_classifier, save_classifier, CheckpointFormat};
pub use efficientnet::{EfficientNet, EfficientNetConfig};

use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use serde::Serialize;
use thiserror::Error;

/// Backend used by the service: CPU tensors with reverse-mode autodiff.
pub type InferenceBackend = Autodiff<NdArray<f32>>;

/// Startup errors. Either one means the service must not start.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Cannot load classifier checkpoint: {0}")]
    FatalLoad(String),

    #[error("Classifier configuration error: {0}")]
    Configuration(String),
}

// ═══════════════════════════════════════════════════════════
// Layer inspection
// ═══════════════════════════════════════════════════════════

/// Kind of a parameterised leaf layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Conv2d,
    BatchNorm,
    Linear,
}

/// Shape of one named parameter tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamShape {
    pub name: &'static str,
    pub dims: Vec<usize>,
}

impl ParamShape {
    pub fn new(name: &'static str, dims: &[usize]) -> Self {
        Self {
            name,
            dims: dims.to_vec(),
        }
    }
}

/// A leaf layer of the network, identified by its module path
/// (e.g. `stages.5.blocks.3.depthwise.conv`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerInfo {
    pub path: String,
    pub kind: LayerKind,
    pub params: Vec<ParamShape>,
}

/// Join a parent module path and a child field name.
pub fn child_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}.{child}")
    }
}

// ═══════════════════════════════════════════════════════════
// Hooks
// ═══════════════════════════════════════════════════════════

/// Observer invoked with the output of every convolution during a forward
/// pass, in execution order.
///
/// The returned tensor replaces the output for the rest of the pass. It must
/// hold the same values; implementations may only change autodiff tracking.
pub trait ForwardHook<B: Backend> {
    fn on_conv_output(&mut self, layer: &str, output: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// Hook that observes nothing.
pub struct NoHook;

impl<B: Backend> ForwardHook<B> for NoHook {
    fn on_conv_output(&mut self, _layer: &str, output: Tensor<B, 4>) -> Tensor<B, 4> {
        output
    }
}

/// A classifier whose leaf layers can be enumerated and whose convolutions
/// can be observed during the forward pass.
pub trait Classifier<B: Backend>: Module<B> {
    /// Leaf layers in declaration order.
    fn layers(&self) -> Vec<LayerInfo>;

    /// Forward pass `(N, 3, H, W) -> (N, classes)` with every convolution
    /// output routed through `hook`.
    fn forward_hooked(&self, input: Tensor<B, 4>, hook: &mut dyn ForwardHook<B>) -> Tensor<B, 2>;

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward_hooked(input, &mut NoHook)
    }
}

/// Pick the Grad-CAM target: the convolution closest to the output.
///
/// Layers are scanned in reverse declaration order and the first
/// convolution wins.
pub fn find_target_layer(layers: &[LayerInfo]) -> Result<&LayerInfo, ModelError> {
    layers
        .iter()
        .rev()
        .find(|layer| layer.kind == LayerKind::Conv2d)
        .ok_or_else(|| {
            ModelError::Configuration(format!(
                "no convolutional layer among {} layers",
                layers.len()
            ))
        })
}
