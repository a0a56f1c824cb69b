//! EfficientNet backbone with the torchvision layer layout.
//!
//! Stage table, channel rounding and block structure follow torchvision's
//! `efficientnet_b0`, so a `state_dict` trained there maps onto these
//! modules one tensor per parameter (see `checkpoint`).

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use super::layers::{ConvNormAct, SqueezeExcitation};
use super::{child_path, Classifier, ForwardHook, LayerInfo, LayerKind, ParamShape};
use crate::diagnosis::Diagnosis;

/// One row of the MBConv stage table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSetting {
    pub expand_ratio: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub repeats: usize,
}

const fn stage(
    expand_ratio: usize,
    kernel_size: usize,
    stride: usize,
    in_channels: usize,
    out_channels: usize,
    repeats: usize,
) -> StageSetting {
    StageSetting {
        expand_ratio,
        kernel_size,
        stride,
        in_channels,
        out_channels,
        repeats,
    }
}

/// EfficientNet-B0 stages before width/depth scaling.
pub const B0_STAGES: [StageSetting; 7] = [
    stage(1, 3, 1, 32, 16, 1),
    stage(6, 3, 2, 16, 24, 2),
    stage(6, 5, 2, 24, 40, 2),
    stage(6, 3, 2, 40, 80, 3),
    stage(6, 5, 1, 80, 112, 3),
    stage(6, 5, 2, 112, 192, 4),
    stage(6, 3, 1, 192, 320, 1),
];

const STEM_CHANNELS: usize = 32;
const CHANNEL_DIVISOR: usize = 8;

/// Configuration for the EfficientNet classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EfficientNetConfig {
    /// Channel multiplier (1.0 for B0).
    pub width_mult: f64,
    /// Block-repeat multiplier (1.0 for B0).
    pub depth_mult: f64,
    /// Number of output classes.
    pub num_classes: usize,
}

impl Default for EfficientNetConfig {
    fn default() -> Self {
        Self::b0(Diagnosis::COUNT)
    }
}

impl EfficientNetConfig {
    pub fn new(width_mult: f64, depth_mult: f64, num_classes: usize) -> Self {
        Self {
            width_mult,
            depth_mult,
            num_classes,
        }
    }

    /// EfficientNet-B0 with a custom classification head.
    pub fn b0(num_classes: usize) -> Self {
        Self::new(1.0, 1.0, num_classes)
    }

    /// Stage table after width/depth scaling.
    pub fn stages(&self) -> Vec<StageSetting> {
        B0_STAGES
            .iter()
            .map(|s| StageSetting {
                in_channels: self.adjust_channels(s.in_channels),
                out_channels: self.adjust_channels(s.out_channels),
                repeats: self.adjust_depth(s.repeats),
                ..*s
            })
            .collect()
    }

    pub fn stem_channels(&self) -> usize {
        self.adjust_channels(STEM_CHANNELS)
    }

    /// Width of the final 1×1 convolution: four times the last stage output.
    pub fn head_channels(&self) -> usize {
        4 * self.adjust_channels(B0_STAGES[B0_STAGES.len() - 1].out_channels)
    }

    fn adjust_channels(&self, channels: usize) -> usize {
        make_divisible(channels as f64 * self.width_mult, CHANNEL_DIVISOR)
    }

    fn adjust_depth(&self, repeats: usize) -> usize {
        ((repeats as f64 * self.depth_mult).ceil() as usize).max(1)
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> EfficientNet<B> {
        EfficientNet::new(self, device)
    }
}

/// Round `value` to the nearest multiple of `divisor`, never going below
/// `divisor` or more than 10% under `value`.
pub fn make_divisible(value: f64, divisor: usize) -> usize {
    let d = divisor as f64;
    let mut rounded = (((value + d / 2.0) / d).floor() * d).max(d);
    if rounded < 0.9 * value {
        rounded += d;
    }
    rounded as usize
}

// ═══════════════════════════════════════════════════════════
// MBConv
// ═══════════════════════════════════════════════════════════

/// Mobile inverted bottleneck: expand → depthwise → squeeze-excitation →
/// project, with a residual connection when shapes allow.
#[derive(Module, Debug)]
pub struct MbConv<B: Backend> {
    pub expand: Option<ConvNormAct<B>>,
    pub depthwise: ConvNormAct<B>,
    pub squeeze: SqueezeExcitation<B>,
    pub project: ConvNormAct<B>,
    pub residual: bool,
}

impl<B: Backend> MbConv<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        expand_ratio: usize,
        kernel_size: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let expanded = make_divisible((in_channels * expand_ratio) as f64, CHANNEL_DIVISOR);
        let expand = (expanded != in_channels)
            .then(|| ConvNormAct::new(in_channels, expanded, 1, 1, 1, true, device));
        let squeeze_channels = (in_channels / 4).max(1);

        Self {
            expand,
            depthwise: ConvNormAct::new(
                expanded,
                expanded,
                kernel_size,
                stride,
                expanded,
                true,
                device,
            ),
            squeeze: SqueezeExcitation::new(expanded, squeeze_channels, device),
            project: ConvNormAct::new(expanded, out_channels, 1, 1, 1, false, device),
            residual: stride == 1 && in_channels == out_channels,
        }
    }

    pub fn forward(
        &self,
        input: Tensor<B, 4>,
        path: &str,
        hook: &mut dyn ForwardHook<B>,
    ) -> Tensor<B, 4> {
        let mut out = input.clone();
        if let Some(expand) = &self.expand {
            out = expand.forward(out, &child_path(path, "expand"), hook);
        }
        let out = self.depthwise.forward(out, &child_path(path, "depthwise"), hook);
        let out = self.squeeze.forward(out, &child_path(path, "squeeze"), hook);
        let out = self.project.forward(out, &child_path(path, "project"), hook);

        // Stochastic depth is the identity at inference.
        if self.residual {
            out + input
        } else {
            out
        }
    }

    pub fn collect_layers(&self, path: &str, out: &mut Vec<LayerInfo>) {
        if let Some(expand) = &self.expand {
            expand.collect_layers(&child_path(path, "expand"), out);
        }
        self.depthwise
            .collect_layers(&child_path(path, "depthwise"), out);
        self.squeeze.collect_layers(&child_path(path, "squeeze"), out);
        self.project.collect_layers(&child_path(path, "project"), out);
    }
}

/// The repeated blocks of one stage table row.
#[derive(Module, Debug)]
pub struct Stage<B: Backend> {
    pub blocks: Vec<MbConv<B>>,
}

impl<B: Backend> Stage<B> {
    pub fn new(setting: &StageSetting, device: &B::Device) -> Self {
        let blocks = (0..setting.repeats)
            .map(|block| {
                let (in_channels, stride) = if block == 0 {
                    (setting.in_channels, setting.stride)
                } else {
                    (setting.out_channels, 1)
                };
                MbConv::new(
                    in_channels,
                    setting.out_channels,
                    setting.expand_ratio,
                    setting.kernel_size,
                    stride,
                    device,
                )
            })
            .collect();
        Self { blocks }
    }

    pub fn forward(
        &self,
        input: Tensor<B, 4>,
        path: &str,
        hook: &mut dyn ForwardHook<B>,
    ) -> Tensor<B, 4> {
        let mut x = input;
        for (b, block) in self.blocks.iter().enumerate() {
            x = block.forward(x, &child_path(path, &format!("blocks.{b}")), hook);
        }
        x
    }

    pub fn collect_layers(&self, path: &str, out: &mut Vec<LayerInfo>) {
        for (b, block) in self.blocks.iter().enumerate() {
            block.collect_layers(&child_path(path, &format!("blocks.{b}")), out);
        }
    }
}

// ═══════════════════════════════════════════════════════════
// EfficientNet
// ═══════════════════════════════════════════════════════════

/// EfficientNet classifier.
///
/// Architecture:
/// - Stem: 3×3 stride-2 convolution
/// - Seven MBConv stages (`stages[s].blocks[b]`)
/// - Head: 1×1 convolution to `4 × last stage width`
/// - Global average pool → linear classifier
///
/// Dropout before the classifier is omitted: it is the identity at
/// inference and the model is never trained here.
#[derive(Module, Debug)]
pub struct EfficientNet<B: Backend> {
    pub stem: ConvNormAct<B>,
    pub stages: Vec<Stage<B>>,
    pub head: ConvNormAct<B>,
    pub classifier: Linear<B>,
}

impl<B: Backend> EfficientNet<B> {
    pub fn new(config: &EfficientNetConfig, device: &B::Device) -> Self {
        let stem_channels = config.stem_channels();
        let stem = ConvNormAct::new(3, stem_channels, 3, 2, 1, true, device);

        let stages = config
            .stages()
            .iter()
            .map(|setting| Stage::new(setting, device))
            .collect();

        let last_stage_channels = config.head_channels() / 4;
        let head = ConvNormAct::new(
            last_stage_channels,
            config.head_channels(),
            1,
            1,
            1,
            true,
            device,
        );
        let classifier = LinearConfig::new(config.head_channels(), config.num_classes).init(device);

        Self {
            stem,
            stages,
            head,
            classifier,
        }
    }

    /// Number of output classes of the linear head.
    pub fn num_classes(&self) -> usize {
        let [_, classes] = self.classifier.weight.val().dims();
        classes
    }
}

impl<B: Backend> Classifier<B> for EfficientNet<B> {
    fn layers(&self) -> Vec<LayerInfo> {
        let mut layers = Vec::new();
        self.stem.collect_layers("stem", &mut layers);
        for (s, stage) in self.stages.iter().enumerate() {
            stage.collect_layers(&format!("stages.{s}"), &mut layers);
        }
        self.head.collect_layers("head", &mut layers);

        let mut params = vec![ParamShape::new(
            "weight",
            &self.classifier.weight.val().dims(),
        )];
        if let Some(bias) = &self.classifier.bias {
            params.push(ParamShape::new("bias", &bias.val().dims()));
        }
        layers.push(LayerInfo {
            path: "classifier".to_string(),
            kind: LayerKind::Linear,
            params,
        });
        layers
    }

    fn forward_hooked(&self, input: Tensor<B, 4>, hook: &mut dyn ForwardHook<B>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(input, "stem", hook);
        for (s, stage) in self.stages.iter().enumerate() {
            x = stage.forward(x, &format!("stages.{s}"), hook);
        }
        let x = self.head.forward(x, "head", hook);

        let [batch, channels, _, _] = x.dims();
        let pooled = x.mean_dim(3).mean_dim(2).reshape([batch, channels]);
        self.classifier.forward(pooled)
    }
}
