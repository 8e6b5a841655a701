// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to these traits rather than to
// concrete loaders or models, so a different on-disk layout or
// a different network can be plugged in without touching the
// train / valid workflows.

use anyhow::Result;

use crate::domain::label_map::LabelMap;
use crate::domain::sample::SegSample;

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Any component that can produce labelled segmentation samples.
///
/// Implementations:
///   - SegFolderLoader → images/ + labels/ directories of one split
pub trait SampleSource {
    /// Load every available sample from this source.
    fn load_all(&self) -> Result<Vec<SegSample>>;
}

// ─── Segmenter ────────────────────────────────────────────────────────────────
/// Anything that turns an image into a dense class prediction.
///
/// Implementations:
///   - Predictor → a restored FCN-8s checkpoint
pub trait Segmenter {
    /// Predict one class id per pixel. The returned map has the
    /// same dimensions as the input image.
    fn segment(&self, image: &image::RgbImage) -> Result<LabelMap>;
}
