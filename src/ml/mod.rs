// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All network, training and prediction code lives here.
//
//   vgg.rs        — VGG-16 backbone, fully convolutional
//                   (fc6-fc8 as convolutions), exposes pool3,
//                   pool4 and the coarse score map
//
//   model.rs      — FCN-8s: backbone + skip-fusion upsampling
//                   heads, per-pixel cross-entropy loss
//
//   schedule.rs   — constant / staircase exponential learning rate
//
//   trainer.rs    — step-based training loop with periodic
//                   summaries and checkpoints
//
//   predictor.rs  — restores a checkpoint and segments images
//
// Backend: WGPU when the `wgpu` feature is on (default),
// otherwise the CPU NdArray backend. Training wraps it in
// Autodiff; validation runs on the inner backend directly so
// dropout is off and no gradient graph is recorded.
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)

use burn::backend::Autodiff;

#[cfg(feature = "wgpu")]
pub type InnerBackend = burn::backend::Wgpu;
#[cfg(not(feature = "wgpu"))]
pub type InnerBackend = burn::backend::NdArray;

pub type TrainBackend = Autodiff<InnerBackend>;

/// VGG-16 feature extractor
pub mod vgg;

/// FCN-8s graph builder and loss
pub mod model;

/// Learning rate schedule
pub mod schedule;

/// Training loop with checkpointing and summaries
pub mod trainer;

/// Checkpoint-backed segmentation
pub mod predictor;
