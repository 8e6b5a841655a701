// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing what a segmentation
// sample IS and how predictions are scored.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Keeping IOU scoring here means it can be unit tested on toy
// arrays without a GPU or a trained model.

// Per-pixel class label grid
pub mod label_map;

// Intersection-over-Union scoring
pub mod iou;

// One image with its ground-truth labels
pub mod sample;

// Core abstractions (traits) that other layers implement
pub mod traits;
