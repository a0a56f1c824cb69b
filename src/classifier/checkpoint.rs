//! Classifier checkpoints.
//!
//! Two formats load into [`EfficientNet`]:
//!
//! - **Named MessagePack** (`*.mpk`): burn's own record format, written by
//!   [`save_classifier`].
//! - **PyTorch** (`*.pt`, `*.pth`): a torchvision `efficientnet_b0`
//!   `state_dict`. Keys are remapped onto this crate's module paths.
//!
//! Loading is all-or-nothing: any parameter whose shape differs from the
//! architecture is a fatal error, never a partial load.

use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use regex::Regex;

use super::efficientnet::{make_divisible, EfficientNet, EfficientNetConfig};
use super::{Classifier, ModelError};

/// On-disk checkpoint format, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// burn named MessagePack (`.mpk`).
    NamedMessagePack,
    /// PyTorch pickled `state_dict` (`.pt` / `.pth`).
    PyTorch,
}

impl CheckpointFormat {
    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("mpk") => Ok(Self::NamedMessagePack),
            Some("pt") | Some("pth") => Ok(Self::PyTorch),
            other => Err(ModelError::FatalLoad(format!(
                "unsupported checkpoint extension {:?} for {} (expected .mpk, .pt or .pth)",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }
}

/// Load a classifier checkpoint, validate every parameter shape against
/// `config`, and freeze the parameters.
pub fn load_classifier<B: Backend>(
    path: &Path,
    config: &EfficientNetConfig,
    device: &B::Device,
) -> Result<EfficientNet<B>, ModelError> {
    if !path.is_file() {
        return Err(ModelError::FatalLoad(format!(
            "checkpoint not found: {}",
            path.display()
        )));
    }

    let format = CheckpointFormat::from_path(path)?;
    let model: EfficientNet<B> = config.init(device);
    let expected = model.layers();

    let record = match format {
        CheckpointFormat::NamedMessagePack => NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(path.to_path_buf(), device)
            .map_err(|e| ModelError::FatalLoad(format!("{}: {e}", path.display())))?,
        CheckpointFormat::PyTorch => {
            let mut args = LoadArgs::new(path.to_path_buf());
            for (pattern, replacement) in torchvision_key_remaps(config)? {
                args = args.with_key_remap(pattern.as_str(), &replacement);
            }
            PyTorchFileRecorder::<FullPrecisionSettings>::new()
                .load(args, device)
                .map_err(|e| ModelError::FatalLoad(format!("{}: {e}", path.display())))?
        }
    };

    let model = model.load_record(record);
    validate_shapes(&expected, &model.layers())?;

    tracing::info!(
        path = %path.display(),
        format = ?format,
        parameters = model.num_params(),
        "Classifier checkpoint loaded"
    );

    Ok(model.no_grad())
}

/// Write `model` as a named MessagePack checkpoint. Returns the path
/// actually written (the recorder forces the `.mpk` extension).
pub fn save_classifier<B: Backend>(
    model: &EfficientNet<B>,
    path: &Path,
) -> Result<PathBuf, ModelError> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(model.clone().into_record(), path.to_path_buf())
        .map_err(|e| ModelError::FatalLoad(format!("cannot write {}: {e}", path.display())))?;
    Ok(path.with_extension("mpk"))
}

fn validate_shapes(
    expected: &[super::LayerInfo],
    loaded: &[super::LayerInfo],
) -> Result<(), ModelError> {
    if expected.len() != loaded.len() {
        return Err(ModelError::FatalLoad(format!(
            "checkpoint has {} layers, architecture expects {}",
            loaded.len(),
            expected.len()
        )));
    }

    for (want, got) in expected.iter().zip(loaded) {
        if want.params != got.params {
            let describe = |layer: &super::LayerInfo| {
                layer
                    .params
                    .iter()
                    .map(|p| format!("{}={:?}", p.name, p.dims))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            return Err(ModelError::FatalLoad(format!(
                "shape mismatch at {}: checkpoint has [{}], architecture expects [{}]",
                want.path,
                describe(got),
                describe(want)
            )));
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// torchvision key layout
// ═══════════════════════════════════════════════════════════

/// Regex remaps from torchvision `efficientnet` `state_dict` keys onto
/// module paths, in application order.
///
/// torchvision layout:
/// - `features.0.{0,1}` stem conv / bn
/// - `features.{s}.{b}.block.{j}` MBConv blocks of stage `s` (1-based);
///   `j` indexes expand (if any), depthwise, squeeze-excitation, project
/// - `features.{last}.{0,1}` head conv / bn
/// - `classifier.1` linear (index 0 is dropout)
pub fn torchvision_key_remaps(
    config: &EfficientNetConfig,
) -> Result<Vec<(Regex, String)>, ModelError> {
    let stages = config.stages();
    let mut rules: Vec<(String, String)> = vec![
        (r"^features\.0\.0\.".into(), "stem.conv.".into()),
        (r"^features\.0\.1\.".into(), "stem.norm.".into()),
    ];

    for (s, setting) in stages.iter().enumerate() {
        let feature = s + 1;
        let expanded = make_divisible(
            (setting.in_channels * setting.expand_ratio) as f64,
            8,
        );
        let mut parts = Vec::with_capacity(4);
        if expanded != setting.in_channels {
            parts.push("expand");
        }
        parts.extend(["depthwise", "squeeze", "project"]);

        for (j, part) in parts.into_iter().enumerate() {
            let prefix = format!(r"^features\.{feature}\.(\d+)\.block\.{j}\.");
            let target = format!("stages.{s}.blocks.${{1}}.{part}.");
            if part == "squeeze" {
                rules.push((prefix, target));
            } else {
                rules.push((format!("{prefix}0\\."), format!("{target}conv.")));
                rules.push((format!("{prefix}1\\."), format!("{target}norm.")));
            }
        }
    }

    let head = stages.len() + 1;
    rules.push((format!(r"^features\.{head}\.0\."), "head.conv.".into()));
    rules.push((format!(r"^features\.{head}\.1\."), "head.norm.".into()));
    rules.push((r"^classifier\.1\.".into(), "classifier.".into()));

    rules
        .into_iter()
        .map(|(pattern, replacement)| {
            Regex::new(&pattern)
                .map(|re| (re, replacement))
                .map_err(|e| ModelError::Configuration(format!("invalid key remap {pattern}: {e}")))
        })
        .collect()
}

/// Apply remaps to a single key, the way the PyTorch recorder does.
pub fn remap_key(remaps: &[(Regex, String)], key: &str) -> String {
    remaps.iter().fold(key.to_string(), |key, (re, replacement)| {
        re.replace_all(&key, replacement.as_str()).into_owned()
    })
}
