// ============================================================
// Layer 3 — LabelMap Domain Type
// ============================================================
// A dense grid of class ids, one per pixel, stored row-major.
// Used both for ground truth loaded from disk and for the
// argmax prediction coming out of the network.
//
//   labels[y * width + x] = class id of pixel (x, y)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
    pub width:  usize,
    pub height: usize,
    pub labels: Vec<u8>,
}

impl LabelMap {
    /// Build a label map, checking that the buffer matches the dimensions.
    pub fn new(width: usize, height: usize, labels: Vec<u8>) -> Result<Self> {
        if labels.len() != width * height {
            bail!(
                "label buffer has {} entries, expected {}x{} = {}",
                labels.len(),
                width,
                height,
                width * height
            );
        }
        Ok(Self { width, height, labels })
    }

    /// A map where every pixel carries the same class.
    #[cfg(test)]
    pub fn filled(width: usize, height: usize, class: u8) -> Self {
        Self { width, height, labels: vec![class; width * height] }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.labels.get(y * self.width + x).copied()
    }

    /// Largest class id present, or None for an empty map.
    pub fn max_class(&self) -> Option<u8> {
        self.labels.iter().copied().max()
    }

    /// Pixel count per class for classes `0..num_classes`.
    /// Ids outside the range are ignored.
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for &c in &self.labels {
            if let Some(slot) = counts.get_mut(c as usize) {
                *slot += 1;
            }
        }
        counts
    }
}
