// ============================================================
// Layer 4 — Segmentation Batcher
// ============================================================
// Implements Burn's Batcher trait to stack SegItems into
// device tensors:
//
//   images: [N, 3, H, W]  float, normalised
//   labels: [N, H, W]     int, class id per pixel
//
// All items in a batch share one size because the preprocessor
// resized them to the configured network input.
//
// Reference: Burn Book §4 (Batcher)

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::dataset::SegItem;

#[derive(Debug, Clone)]
pub struct SegBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub labels: Tensor<B, 3, Int>,
}

#[derive(Clone, Debug)]
pub struct SegBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> SegBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<SegItem, SegBatch<B>> for SegBatcher<B> {
    fn batch(&self, items: Vec<SegItem>) -> SegBatch<B> {
        let n = items.len();
        let (h, w) = items
            .first()
            .map(|item| (item.height, item.width))
            .unwrap_or((0, 0));

        let pixels: Vec<f32> = items.iter().flat_map(|i| i.pixels.iter().copied()).collect();
        let labels: Vec<i64> = items
            .iter()
            .flat_map(|i| i.labels.iter().map(|&c| c as i64))
            .collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [n, 3, h, w]).convert::<B::FloatElem>(),
            &self.device,
        );
        let labels = Tensor::<B, 3, Int>::from_data(
            TensorData::new(labels, [n, h, w]).convert::<B::IntElem>(),
            &self.device,
        );

        SegBatch { images, labels }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_batch_shapes() {
        let item = SegItem {
            pixels: vec![0.5; 3 * 2 * 4],
            labels: vec![0, 1, 2, 1, 0, 1, 2, 1],
            height: 2,
            width:  4,
        };
        let batcher = SegBatcher::<NdArray>::new(Default::default());
        let batch   = batcher.batch(vec![item.clone(), item]);
        assert_eq!(batch.images.dims(), [2, 3, 2, 4]);
        assert_eq!(batch.labels.dims(), [2, 2, 4]);

        let sum: i64 = batch.labels.sum().into_scalar().elem::<i64>();
        assert_eq!(sum, 16);
    }
}
