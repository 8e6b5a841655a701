// ============================================================
// Layer 3 — SegSample Domain Type
// ============================================================
// One RGB image paired with its per-pixel ground truth.
// By the time a SegSample exists, both files have been decoded
// and checked to have the same dimensions.

use anyhow::{bail, Result};
use image::RgbImage;

use crate::domain::label_map::LabelMap;

#[derive(Debug, Clone)]
pub struct SegSample {
    /// File stem the sample was loaded from, kept for traceability
    pub source: String,
    pub image:  RgbImage,
    pub label:  LabelMap,
}

impl SegSample {
    pub fn new(source: impl Into<String>, image: RgbImage, label: LabelMap) -> Result<Self> {
        let source = source.into();
        let (w, h) = image.dimensions();
        if w as usize != label.width || h as usize != label.height {
            bail!(
                "sample '{}': image is {}x{} but label map is {}x{}",
                source,
                w,
                h,
                label.width,
                label.height
            );
        }
        Ok(Self { source, image, label })
    }

    pub fn width(&self) -> usize {
        self.label.width
    }

    pub fn height(&self) -> usize {
        self.label.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let image = RgbImage::new(4, 2);
        assert!(SegSample::new("a", image.clone(), LabelMap::filled(4, 2, 0)).is_ok());
        assert!(SegSample::new("b", image, LabelMap::filled(2, 4, 0)).is_err());
    }
}
