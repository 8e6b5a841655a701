// ============================================================
// Layer 5 — FCN-8s Graph Builder
// ============================================================
// Composes the VGG-16 backbone with three skip-fusion
// upsampling heads:
//
//   input ──pad 96──► VGG-16 ─┬─ pool3 ─ ×1e-4 ─ conv1x1 ─ crop ─────────┐
//                             ├─ pool4 ─ ×0.01 ─ conv1x1 ─ crop ──┐      │
//                             └─ score (stride 32)                 │      │
//                                  │                               │      │
//                                  ▼ convT k4 s2                   │      │
//                              up_score ────────── + ◄─────────────┘      │
//                                                  │ fuse1                │
//                                                  ▼ convT k4 s2          │
//                                              up_fuse1 ─────── + ◄───────┘
//                                                               │ fuse2
//                                                               ▼ convT k16 s8
//                                                            logits [N, C, H, W]
//
// The 96 px zero padding gives the 7x7 valid fc6 room to slide;
// for an input whose sides are multiples of 32 the upsampled
// score maps line up with a centred crop of the pool features
// and the final logits come out at exactly the input size.
//
// The 1e-4 / 0.01 factors scale the skip features down so the
// freshly initialised heads start close to the plain FCN-32s
// prediction.
//
// Score convs and transposed convs are linear (no ReLU), so fused
// class scores may be negative before the softmax.
//
// Reference: Long, Shelhamer & Darrell (2015) FCN for Semantic Segmentation

use anyhow::{bail, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        loss::CrossEntropyLossConfig,
    },
    prelude::*,
};

use crate::ml::vgg::{Vgg16, Vgg16Config};

/// Zero padding added on every side before the backbone.
pub const INPUT_PADDING: usize = 96;
/// Input height and width must be multiples of the backbone stride.
pub const OUTPUT_STRIDE: usize = 32;

const POOL3_SCALE: f64 = 1e-4;
const POOL4_SCALE: f64 = 1e-2;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct Fcn8sConfig {
    pub num_classes: usize,
    #[config(default = 64)]
    pub base_channels: usize,
    #[config(default = 4096)]
    pub fc_dim: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl Fcn8sConfig {
    pub fn backbone(&self) -> Vgg16Config {
        Vgg16Config::new(self.num_classes)
            .with_base_channels(self.base_channels)
            .with_fc_dim(self.fc_dim)
            .with_dropout(self.dropout)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Fcn8s<B> {
        let backbone_cfg = self.backbone();
        let c = self.num_classes;

        let score_pool3 = Conv2dConfig::new([backbone_cfg.pool3_channels(), c], [1, 1]).init(device);
        let score_pool4 = Conv2dConfig::new([backbone_cfg.pool4_channels(), c], [1, 1]).init(device);

        // padding chosen so every transposed conv multiplies the size by its stride
        let up_score = ConvTranspose2dConfig::new([c, c], [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .init(device);
        let up_fuse1 = ConvTranspose2dConfig::new([c, c], [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .init(device);
        let up_fuse2 = ConvTranspose2dConfig::new([c, c], [16, 16])
            .with_stride([8, 8])
            .with_padding([4, 4])
            .init(device);

        Fcn8s {
            backbone: backbone_cfg.init(device),
            score_pool3,
            score_pool4,
            up_score,
            up_fuse1,
            up_fuse2,
        }
    }
}

/// Reject input sizes the decoder cannot align.
pub fn validate_input_size(height: usize, width: usize) -> Result<()> {
    if height == 0 || width == 0 || height % OUTPUT_STRIDE != 0 || width % OUTPUT_STRIDE != 0 {
        bail!(
            "input size {}x{} is not supported: height and width must be non-zero multiples of {}",
            height,
            width,
            OUTPUT_STRIDE
        );
    }
    Ok(())
}

/// Centre crop of the last two dims down to `height` x `width`.
pub fn center_crop<B: Backend>(x: Tensor<B, 4>, height: usize, width: usize) -> Tensor<B, 4> {
    let [n, c, h, w] = x.dims();
    let top  = h.saturating_sub(height) / 2;
    let left = w.saturating_sub(width) / 2;
    x.slice([0..n, 0..c, top..top + height.min(h), left..left + width.min(w)])
}

#[derive(Module, Debug)]
pub struct Fcn8s<B: Backend> {
    pub backbone:    Vgg16<B>,
    pub score_pool3: Conv2d<B>,
    pub score_pool4: Conv2d<B>,
    pub up_score:    ConvTranspose2d<B>,
    pub up_fuse1:    ConvTranspose2d<B>,
    pub up_fuse2:    ConvTranspose2d<B>,
}

impl<B: Backend> Fcn8s<B> {
    /// images: [N, 3, H, W] → per-class logits [N, num_classes, H, W]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let padded = images.pad(
            (INPUT_PADDING, INPUT_PADDING, INPUT_PADDING, INPUT_PADDING),
            0.0,
        );
        let ends = self.backbone.forward(padded);

        let score_pool3 = self.score_pool3.forward(ends.pool3.mul_scalar(POOL3_SCALE));
        let score_pool4 = self.score_pool4.forward(ends.pool4.mul_scalar(POOL4_SCALE));

        let up_score = self.up_score.forward(ends.score);
        let [_, _, h, w] = up_score.dims();
        let fuse1 = up_score + center_crop(score_pool4, h, w);

        let up_fuse1 = self.up_fuse1.forward(fuse1);
        let [_, _, h, w] = up_fuse1.dims();
        let fuse2 = up_fuse1 + center_crop(score_pool3, h, w);

        self.up_fuse2.forward(fuse2)
    }

    /// Class id per pixel: [N, H, W]
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 3, Int> {
        logits_to_labels(self.forward(images))
    }

    /// Mean per-pixel sparse softmax cross-entropy.
    ///
    /// labels: [N, H, W] class ids. Returns the scalar loss and the
    /// logits so callers can also derive predictions.
    pub fn forward_loss(
        &self,
        images: Tensor<B, 4>,
        labels: Tensor<B, 3, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 4>) {
        let logits = self.forward(images);
        let [n, c, h, w] = logits.dims();

        // [N, C, H, W] → [N, H, W, C] → [N·H·W, C]
        let flat = logits
            .clone()
            .swap_dims(1, 2)
            .swap_dims(2, 3)
            .reshape([n * h * w, c]);
        let targets = labels.reshape([n * h * w]);

        let loss = CrossEntropyLossConfig::new()
            .init(&flat.device())
            .forward(flat, targets);
        (loss, logits)
    }
}

/// argmax over the class dimension: [N, C, H, W] → [N, H, W]
pub fn logits_to_labels<B: Backend>(logits: Tensor<B, 4>) -> Tensor<B, 3, Int> {
    logits.argmax(1).squeeze::<3>(1)
}
