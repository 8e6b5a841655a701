// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Brings raw samples into the shape the network expects.
//
// Steps:
//   1. Resize image and label map to the configured size
//      - images use a triangle (bilinear) filter
//      - labels use nearest neighbour so no new class ids
//        are invented at region borders
//   2. (training only) random horizontal flip, applied to the
//      image and the label map together
//   3. Convert the RGB image to CHW floats normalised with the
//      ImageNet statistics the torchvision VGG-16 weights were
//      trained with:  (x / 255 - mean) / std
//
// Reference: image crate docs (imageops::resize, flip_horizontal)

use anyhow::{Context, Result};
use image::{imageops, imageops::FilterType, GrayImage, RgbImage};
use rand::Rng;

use crate::domain::label_map::LabelMap;
use crate::domain::sample::SegSample;

/// Per-channel RGB mean of ImageNet, in [0, 1].
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel RGB standard deviation of ImageNet.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone)]
pub struct Preprocessor {
    pub height:    u32,
    pub width:     u32,
    /// Probability of a horizontal flip, 0.0 disables augmentation
    pub flip_prob: f64,
}

impl Preprocessor {
    pub fn new(height: u32, width: u32, flip_prob: f64) -> Self {
        Self { height, width, flip_prob: flip_prob.clamp(0.0, 1.0) }
    }

    /// Resize a sample to the configured size. Samples that already
    /// have the right size are returned unchanged.
    pub fn resize(&self, sample: &SegSample) -> Result<SegSample> {
        if sample.width() == self.width as usize && sample.height() == self.height as usize {
            return Ok(sample.clone());
        }

        let image = imageops::resize(&sample.image, self.width, self.height, FilterType::Triangle);

        let gray = GrayImage::from_raw(
            sample.label.width as u32,
            sample.label.height as u32,
            sample.label.labels.clone(),
        )
        .with_context(|| format!("Label buffer of '{}' does not match its size", sample.source))?;
        let gray   = imageops::resize(&gray, self.width, self.height, FilterType::Nearest);
        let label  = LabelMap::new(self.width as usize, self.height as usize, gray.into_raw())?;

        SegSample::new(sample.source.clone(), image, label)
    }

    /// Randomly flip a sample left-right with probability `flip_prob`.
    pub fn augment<R: Rng>(&self, sample: SegSample, rng: &mut R) -> SegSample {
        if self.flip_prob > 0.0 && rng.gen_bool(self.flip_prob) {
            flip_horizontal(sample)
        } else {
            sample
        }
    }
}

/// Mirror image and labels around the vertical axis.
pub fn flip_horizontal(sample: SegSample) -> SegSample {
    let image = imageops::flip_horizontal(&sample.image);
    let (w, h) = (sample.label.width, sample.label.height);
    let mut labels = Vec::with_capacity(sample.label.labels.len());
    for row in sample.label.labels.chunks(w.max(1)) {
        labels.extend(row.iter().rev());
    }
    SegSample {
        source: sample.source,
        image,
        label:  LabelMap { width: w, height: h, labels },
    }
}

/// RGB image → normalised CHW float buffer of length 3 * H * W.
pub fn to_chw(image: &RgbImage) -> Vec<f32> {
    let (w, h) = image.dimensions();
    let plane  = (w * h) as usize;
    let mut out = vec![0.0f32; 3 * plane];
    for (i, pixel) in image.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = (pixel[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    out
}

/// Inverse of `to_chw`, used to turn a batch tensor back into a
/// viewable image for training summaries.
pub fn from_chw(values: &[f32], height: usize, width: usize) -> RgbImage {
    let plane = height * width;
    let mut image = RgbImage::new(width as u32, height as u32);
    for (i, pixel) in image.pixels_mut().enumerate() {
        for c in 0..3 {
            let v = values.get(c * plane + i).copied().unwrap_or(0.0);
            let v = (v * IMAGENET_STD[c] + IMAGENET_MEAN[c]) * 255.0;
            pixel[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    image
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn sample(w: u32, h: u32, labels: Vec<u8>) -> SegSample {
        let mut image = RgbImage::new(w, h);
        for (x, _, p) in image.enumerate_pixels_mut() {
            *p = Rgb([x as u8 * 10, 0, 0]);
        }
        let label = LabelMap::new(w as usize, h as usize, labels).unwrap();
        SegSample::new("s", image, label).unwrap()
    }

    #[test]
    fn test_resize_keeps_label_ids() {
        let s = sample(2, 2, vec![0, 2, 1, 2]);
        let p = Preprocessor::new(4, 4, 0.0);
        let r = p.resize(&s).unwrap();
        assert_eq!(r.width(), 4);
        assert_eq!(r.height(), 4);
        // nearest neighbour never produces ids absent from the source
        assert!(r.label.labels.iter().all(|&c| c == 0 || c == 1 || c == 2));
        assert_eq!(r.label.get(0, 0), Some(0));
        assert_eq!(r.label.get(3, 3), Some(2));
    }

    #[test]
    fn test_flip_mirrors_image_and_labels() {
        let s = sample(3, 1, vec![0, 1, 2]);
        let f = flip_horizontal(s);
        assert_eq!(f.label.labels, vec![2, 1, 0]);
        assert_eq!(f.image.get_pixel(0, 0), &Rgb([20, 0, 0]));
        assert_eq!(f.image.get_pixel(2, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_zero_flip_prob_never_flips() {
        let p = Preprocessor::new(1, 3, 0.0);
        let mut rng = rand::thread_rng();
        for _ in 0..10 {
            let out = p.augment(sample(3, 1, vec![0, 1, 2]), &mut rng);
            assert_eq!(out.label.labels, vec![0, 1, 2]);
        }
    }

    #[test]
    fn test_chw_round_trip_is_close() {
        let s = sample(3, 2, vec![0; 6]);
        let chw = to_chw(&s.image);
        assert_eq!(chw.len(), 18);
        let back = from_chw(&chw, 2, 3);
        assert_eq!(back, s.image);
    }
}
