//! Building blocks shared by the backbone: frozen batch norm,
//! convolution + norm + activation, and squeeze-excitation.

use burn::module::Param;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::tensor::activation::{sigmoid, silu};

use super::{child_path, ForwardHook, LayerInfo, LayerKind, ParamShape};

/// Batch-norm epsilon used by torchvision EfficientNet-B0.
const BATCH_NORM_EPSILON: f64 = 1e-5;

// ═══════════════════════════════════════════════════════════
// FrozenBatchNorm
// ═══════════════════════════════════════════════════════════

/// Batch normalisation that always normalises with the stored running
/// statistics.
///
/// burn's `BatchNorm` switches to batch statistics whenever the backend has
/// autodiff enabled, which is always the case here since Grad-CAM needs a
/// backward pass. Field names follow the PyTorch `state_dict` layout so
/// checkpoints load without renaming.
#[derive(Module, Debug)]
pub struct FrozenBatchNorm<B: Backend> {
    pub weight: Param<Tensor<B, 1>>,
    pub bias: Param<Tensor<B, 1>>,
    pub running_mean: Param<Tensor<B, 1>>,
    pub running_var: Param<Tensor<B, 1>>,
    pub epsilon: f64,
}

impl<B: Backend> FrozenBatchNorm<B> {
    /// Identity normalisation over `channels` channels.
    pub fn new(channels: usize, device: &B::Device) -> Self {
        Self {
            weight: Param::from_tensor(Tensor::ones([channels], device)),
            bias: Param::from_tensor(Tensor::zeros([channels], device)),
            running_mean: Param::from_tensor(Tensor::zeros([channels], device)),
            running_var: Param::from_tensor(Tensor::ones([channels], device)),
            epsilon: BATCH_NORM_EPSILON,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [channels] = self.weight.val().dims();
        let scale = self.weight.val() / (self.running_var.val() + self.epsilon).sqrt();
        let shift = self.bias.val() - self.running_mean.val() * scale.clone();

        input * scale.reshape([1, channels, 1, 1]) + shift.reshape([1, channels, 1, 1])
    }

    fn info(&self, path: String) -> LayerInfo {
        LayerInfo {
            path,
            kind: LayerKind::BatchNorm,
            params: vec![
                ParamShape::new("weight", &self.weight.val().dims()),
                ParamShape::new("bias", &self.bias.val().dims()),
                ParamShape::new("running_mean", &self.running_mean.val().dims()),
                ParamShape::new("running_var", &self.running_var.val().dims()),
            ],
        }
    }
}

fn conv_info<B: Backend>(conv: &Conv2d<B>, path: String) -> LayerInfo {
    let mut params = vec![ParamShape::new("weight", &conv.weight.val().dims())];
    if let Some(bias) = &conv.bias {
        params.push(ParamShape::new("bias", &bias.val().dims()));
    }
    LayerInfo {
        path,
        kind: LayerKind::Conv2d,
        params,
    }
}

// ═══════════════════════════════════════════════════════════
// ConvNormAct
// ═══════════════════════════════════════════════════════════

/// Convolution (no bias) → frozen batch norm → optional SiLU.
#[derive(Module, Debug)]
pub struct ConvNormAct<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: FrozenBatchNorm<B>,
    pub activation: bool,
}

impl<B: Backend> ConvNormAct<B> {
    /// Square kernel with "same"-style padding `(kernel - 1) / 2`.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
        activation: bool,
        device: &B::Device,
    ) -> Self {
        let padding = (kernel_size - 1) / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .init(device);

        Self {
            conv,
            norm: FrozenBatchNorm::new(out_channels, device),
            activation,
        }
    }

    pub fn forward(
        &self,
        input: Tensor<B, 4>,
        path: &str,
        hook: &mut dyn ForwardHook<B>,
    ) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        let out = hook.on_conv_output(&child_path(path, "conv"), out);
        let out = self.norm.forward(out);
        if self.activation {
            silu(out)
        } else {
            out
        }
    }

    pub fn collect_layers(&self, path: &str, out: &mut Vec<LayerInfo>) {
        out.push(conv_info(&self.conv, child_path(path, "conv")));
        out.push(self.norm.info(child_path(path, "norm")));
    }
}

// ═══════════════════════════════════════════════════════════
// SqueezeExcitation
// ═══════════════════════════════════════════════════════════

/// Channel attention: global pool → 1×1 conv → SiLU → 1×1 conv → sigmoid,
/// then rescale the input channels.
#[derive(Module, Debug)]
pub struct SqueezeExcitation<B: Backend> {
    pub fc1: Conv2d<B>,
    pub fc2: Conv2d<B>,
}

impl<B: Backend> SqueezeExcitation<B> {
    pub fn new(channels: usize, squeeze_channels: usize, device: &B::Device) -> Self {
        Self {
            fc1: Conv2dConfig::new([channels, squeeze_channels], [1, 1]).init(device),
            fc2: Conv2dConfig::new([squeeze_channels, channels], [1, 1]).init(device),
        }
    }

    pub fn forward(
        &self,
        input: Tensor<B, 4>,
        path: &str,
        hook: &mut dyn ForwardHook<B>,
    ) -> Tensor<B, 4> {
        let pooled = input.clone().mean_dim(3).mean_dim(2);
        let scale = self.fc1.forward(pooled);
        let scale = hook.on_conv_output(&child_path(path, "fc1"), scale);
        let scale = silu(scale);
        let scale = self.fc2.forward(scale);
        let scale = hook.on_conv_output(&child_path(path, "fc2"), scale);
        input * sigmoid(scale)
    }

    pub fn collect_layers(&self, path: &str, out: &mut Vec<LayerInfo>) {
        out.push(conv_info(&self.fc1, child_path(path, "fc1")));
        out.push(conv_info(&self.fc2, child_path(path, "fc2")));
    }
}
