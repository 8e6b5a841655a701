// ============================================================
// Layer 6 — Pretrained Backbone Weights
// ============================================================
// Initialises the VGG-16 convolutions from a torchvision
// ImageNet checkpoint (`vgg16-*.pth`).
//
// torchvision stores the feature extractor as one flat
// nn.Sequential, so convolution weights sit at the indices of
// that sequence (ReLU and MaxPool entries have no weights):
//
//   features.0.weight  → convs.0.weight
//   features.2.weight  → convs.1.weight
//   features.5.weight  → convs.2.weight
//   ...
//   features.28.weight → convs.12.weight
//
// Only the convolutions are restored. fc6/fc7 of the torch model
// are Linear layers, fc8 has 1000 ImageNet classes and the FCN
// heads do not exist there, so all of those keep their fresh
// initialisation. Weight layout [out, in, kh, kw] is the same in
// torch and Burn, no transposition needed.

use anyhow::{bail, Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, Recorder},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::Path;

use crate::ml::{
    model::Fcn8s,
    vgg::{Vgg16FeaturesRecord, BLOCK_DEPTHS},
};

/// Positions of the convolutions inside torchvision's `features`.
pub const TORCH_CONV_INDICES: [usize; 13] = [0, 2, 5, 7, 10, 12, 14, 17, 19, 21, 24, 26, 28];

/// Channel width the torchvision weights were trained with.
pub const PRETRAINED_BASE_CHANNELS: usize = 64;

/// Key remapping from torchvision names to `Vgg16Features` fields.
pub fn key_remaps() -> Vec<(String, String)> {
    TORCH_CONV_INDICES
        .iter()
        .enumerate()
        .map(|(ours, theirs)| (format!(r"^features\.{theirs}\."), format!("convs.{ours}.")))
        .collect()
}

/// Load the torchvision convolutions into the backbone of `model`.
pub fn load_vgg16_features<B: Backend>(
    model:          Fcn8s<B>,
    path:           &Path,
    base_channels:  usize,
    device:         &B::Device,
) -> Result<Fcn8s<B>> {
    if base_channels != PRETRAINED_BASE_CHANNELS {
        bail!(
            "pretrained VGG-16 weights need base_channels = {}, got {}",
            PRETRAINED_BASE_CHANNELS,
            base_channels
        );
    }
    if !path.exists() {
        bail!(
            "Pretrained checkpoint '{}' not found. Pass --from-scratch to train without it.",
            path.display()
        );
    }
    debug_assert_eq!(BLOCK_DEPTHS.iter().sum::<usize>(), TORCH_CONV_INDICES.len());

    let mut args = LoadArgs::new(path.to_path_buf());
    for (pattern, replacement) in key_remaps() {
        args = args.with_key_remap(&pattern, &replacement);
    }

    let record: Vgg16FeaturesRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(args, device)
        .with_context(|| format!("Cannot load VGG-16 weights from '{}'", path.display()))?;

    let mut model = model;
    model.backbone.features = model.backbone.features.load_record(record);
    tracing::info!("Initialised backbone from '{}'", path.display());
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::Fcn8sConfig;
    use burn::backend::NdArray;

    #[test]
    fn test_remaps_cover_every_convolution() {
        let remaps = key_remaps();
        assert_eq!(remaps.len(), 13);
        assert_eq!(remaps[0], (r"^features\.0\.".to_string(), "convs.0.".to_string()));
        assert_eq!(remaps[12], (r"^features\.28\.".to_string(), "convs.12.".to_string()));
    }

    #[test]
    fn test_rejects_narrow_backbone_and_missing_file() {
        let device = Default::default();
        let cfg    = Fcn8sConfig::new(2).with_base_channels(1).with_fc_dim(2);
        let model: Fcn8s<NdArray> = cfg.init(&device);
        let err = load_vgg16_features(model, Path::new("vgg16.pth"), 1, &device);
        assert!(err.is_err());

        let dir   = tempfile::tempdir().unwrap();
        let model: Fcn8s<NdArray> = cfg.init(&device);
        let err = load_vgg16_features(model, &dir.path().join("missing.pth"), 64, &device);
        assert!(err.is_err());
    }
}
