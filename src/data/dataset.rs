use burn::data::dataset::Dataset;

use crate::data::preprocessor::{to_chw, Preprocessor};
use crate::domain::sample::SegSample;

/// One network-ready sample: normalised CHW pixels plus class ids.
#[derive(Debug, Clone)]
pub struct SegItem {
    pub pixels: Vec<f32>,
    pub labels: Vec<u8>,
    pub height: usize,
    pub width:  usize,
}

impl SegItem {
    pub fn from_sample(sample: &SegSample) -> Self {
        Self {
            pixels: to_chw(&sample.image),
            labels: sample.label.labels.clone(),
            height: sample.height(),
            width:  sample.width(),
        }
    }
}

/// Samples already resized to the network input size. Augmentation
/// runs lazily in `get`, so every pass over the data sees a fresh
/// random flip.
pub struct SegDataset {
    samples:      Vec<SegSample>,
    preprocessor: Preprocessor,
}

impl SegDataset {
    pub fn new(samples: Vec<SegSample>, preprocessor: Preprocessor) -> Self {
        Self { samples, preprocessor }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Dataset<SegItem> for SegDataset {
    fn get(&self, index: usize) -> Option<SegItem> {
        let sample = self.samples.get(index)?.clone();
        let sample = self.preprocessor.augment(sample, &mut rand::thread_rng());
        Some(SegItem::from_sample(&sample))
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::label_map::LabelMap;
    use image::RgbImage;

    #[test]
    fn test_get_returns_chw_item() {
        let sample = SegSample::new("a", RgbImage::new(3, 2), LabelMap::filled(3, 2, 1)).unwrap();
        let ds = SegDataset::new(vec![sample], Preprocessor::new(2, 3, 0.0));
        assert_eq!(ds.len(), 1);
        let item = ds.get(0).unwrap();
        assert_eq!(item.pixels.len(), 3 * 2 * 3);
        assert_eq!(item.labels, vec![1; 6]);
        assert_eq!((item.height, item.width), (2, 3));
        assert!(ds.get(1).is_none());
    }
}
