// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From image/label files on disk to device tensor batches:
//
//   images/ + labels/
//       │
//       ▼
//   SegFolderLoader   → decodes pairs into SegSamples
//       │
//       ▼
//   Preprocessor      → resize (+ random flip when training)
//       │
//       ▼
//   SegDataset        → implements Burn's Dataset trait
//       │
//       ▼
//   SegBatcher        → stacks items into [N,3,H,W] / [N,H,W]
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Loads one dataset split from disk
pub mod loader;

/// Resizing, augmentation and normalisation
pub mod preprocessor;

/// Implements Burn's Dataset trait for segmentation samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
