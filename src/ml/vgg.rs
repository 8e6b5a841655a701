// ============================================================
// Layer 5 — VGG-16 Backbone
// ============================================================
// The classification network reused as a feature extractor.
//
//   block1: 2 × conv3x3(64)   → maxpool 2x2
//   block2: 2 × conv3x3(128)  → maxpool 2x2
//   block3: 3 × conv3x3(256)  → maxpool 2x2   ← pool3 (stride 8)
//   block4: 3 × conv3x3(512)  → maxpool 2x2   ← pool4 (stride 16)
//   block5: 3 × conv3x3(512)  → maxpool 2x2   (stride 32)
//   fc6:    conv7x7 valid (4096), relu, dropout
//   fc7:    conv1x1 (4096),      relu, dropout
//   fc8:    conv1x1 (num_classes)             ← score
//
// fc6..fc8 are the fully connected layers of the classifier
// written as convolutions, so the network accepts any input
// size and produces a coarse score map instead of one vector.
//
// Channel widths scale with `base_channels` (64 for the real
// network). Smaller widths are only useful for tests.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

/// Convolutions per block.
pub const BLOCK_DEPTHS: [usize; 5] = [2, 2, 3, 3, 3];
/// Width of each block as a multiple of `base_channels`.
pub const BLOCK_WIDTHS: [usize; 5] = [1, 2, 4, 8, 8];

#[derive(Config, Debug)]
pub struct Vgg16Config {
    pub num_classes: usize,
    #[config(default = 64)]
    pub base_channels: usize,
    #[config(default = 4096)]
    pub fc_dim: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl Vgg16Config {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg16<B> {
        let mut convs    = Vec::with_capacity(13);
        let mut channels = 3;
        for (depth, width) in BLOCK_DEPTHS.iter().zip(BLOCK_WIDTHS.iter()) {
            let out = self.base_channels * width;
            for _ in 0..*depth {
                convs.push(
                    Conv2dConfig::new([channels, out], [3, 3])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .init(device),
                );
                channels = out;
            }
        }

        let fc6 = Conv2dConfig::new([channels, self.fc_dim], [7, 7])
            .with_padding(PaddingConfig2d::Valid)
            .init(device);
        let fc7 = Conv2dConfig::new([self.fc_dim, self.fc_dim], [1, 1]).init(device);
        let fc8 = Conv2dConfig::new([self.fc_dim, self.num_classes], [1, 1]).init(device);

        Vgg16 {
            features: Vgg16Features { convs },
            pool:     MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc6,
            fc7,
            fc8,
            dropout:  DropoutConfig::new(self.dropout).init(),
        }
    }

    /// Channels of the pool3 feature map.
    pub fn pool3_channels(&self) -> usize {
        self.base_channels * BLOCK_WIDTHS[2]
    }

    /// Channels of the pool4 feature map.
    pub fn pool4_channels(&self) -> usize {
        self.base_channels * BLOCK_WIDTHS[3]
    }
}

/// The thirteen 3x3 convolutions, kept in their own module so the
/// pretrained ImageNet weights can be loaded into them alone.
#[derive(Module, Debug)]
pub struct Vgg16Features<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
}

#[derive(Module, Debug)]
pub struct Vgg16<B: Backend> {
    pub features: Vgg16Features<B>,
    pub pool:     MaxPool2d,
    pub fc6:      Conv2d<B>,
    pub fc7:      Conv2d<B>,
    pub fc8:      Conv2d<B>,
    pub dropout:  Dropout,
}

/// Intermediate activations the FCN decoder taps into.
pub struct VggEndPoints<B: Backend> {
    pub pool3: Tensor<B, 4>,
    pub pool4: Tensor<B, 4>,
    pub score: Tensor<B, 4>,
}

impl<B: Backend> Vgg16<B> {
    /// images: [N, 3, H, W] → end points at strides 8, 16 and 32
    pub fn forward(&self, images: Tensor<B, 4>) -> VggEndPoints<B> {
        let mut x     = images;
        let mut convs = self.features.convs.iter();
        let mut pools = Vec::with_capacity(BLOCK_DEPTHS.len());

        for depth in BLOCK_DEPTHS {
            for conv in convs.by_ref().take(depth) {
                x = relu(conv.forward(x));
            }
            x = self.pool.forward(x);
            pools.push(x.clone());
        }

        let x = self.dropout.forward(relu(self.fc6.forward(x)));
        let x = self.dropout.forward(relu(self.fc7.forward(x)));
        let score = self.fc8.forward(x);

        let pool4 = pools.swap_remove(3);
        let pool3 = pools.swap_remove(2);
        VggEndPoints { pool3, pool4, score }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn test_has_thirteen_convolutions() {
        let device = Default::default();
        let vgg: Vgg16<B> = Vgg16Config::new(3).with_base_channels(2).with_fc_dim(4).init(&device);
        assert_eq!(vgg.features.convs.len(), 13);
    }

    #[test]
    fn test_end_point_strides() {
        let device = Default::default();
        let cfg = Vgg16Config::new(3).with_base_channels(2).with_fc_dim(4).with_dropout(0.0);
        let vgg: Vgg16<B> = cfg.init(&device);

        // 224 / 32 = 7 → fc6 (7x7 valid) collapses to 1x1
        let out = vgg.forward(Tensor::zeros([1, 3, 224, 224], &device));
        assert_eq!(out.pool3.dims(), [1, cfg.pool3_channels(), 28, 28]);
        assert_eq!(out.pool4.dims(), [1, cfg.pool4_channels(), 14, 14]);
        assert_eq!(out.score.dims(), [1, 3, 1, 1]);
    }
}
