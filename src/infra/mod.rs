// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting file-system concerns:
//
//   checkpoint.rs  — model weights, latest-step pointer,
//                    train_config.json and info.txt in log_dir
//
//   pretrained.rs  — ImageNet VGG-16 weights from a torchvision
//                    .pth file into the backbone
//
//   metrics.rs     — step / learning rate / loss CSV
//
//   visualize.rs   — JET colormap, validation overlays and
//                    summary images as PNG
//
// Reference: Rust Book §9 (Error Handling with anyhow)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Pretrained backbone initialisation
pub mod pretrained;

/// Training metrics CSV logger
pub mod metrics;

/// Label map rendering and PNG output
pub mod visualize;
