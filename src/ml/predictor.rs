// ============================================================
// Layer 5 — Predictor
// ============================================================
// Restores a trained FCN-8s from a log directory and turns
// RGB images into label maps.
use anyhow::Result;
use burn::prelude::*;
use image::RgbImage;

use crate::data::preprocessor::to_chw;
use crate::domain::label_map::LabelMap;
use crate::domain::traits::Segmenter;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::{validate_input_size, Fcn8s};

pub struct Predictor<B: Backend> {
    model:  Fcn8s<B>,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: Fcn8s<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    /// Rebuild the network described by `train_config.json` and load
    /// the newest weights into it.
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager, device: B::Device) -> Result<Self> {
        let cfg       = ckpt_manager.load_config()?;
        let model_cfg = cfg.model_config();
        let model     = ckpt_manager.load_model(model_cfg.init::<B>(&device), &device)?;
        tracing::info!("Model loaded from '{}'", ckpt_manager.dir().display());
        Ok(Self::new(model, device))
    }
}

impl<B: Backend> Segmenter for Predictor<B> {
    fn segment(&self, image: &RgbImage) -> Result<LabelMap> {
        let (w, h) = (image.width() as usize, image.height() as usize);
        validate_input_size(h, w)?;

        let input = Tensor::<B, 4>::from_data(
            TensorData::new(to_chw(image), [1, 3, h, w]).convert::<B::FloatElem>(),
            &self.device,
        );
        let pred = self.model.predict(input).reshape([h, w]);
        label_map_from_tensor(pred)
    }
}

/// Copy a [H, W] class-id tensor to the host as a LabelMap.
pub fn label_map_from_tensor<B: Backend>(labels: Tensor<B, 2, Int>) -> Result<LabelMap> {
    let [h, w] = labels.dims();
    let values: Vec<i64> = labels
        .into_data()
        .convert::<i64>()
        .to_vec()
        .map_err(|e| anyhow::anyhow!("Cannot read prediction tensor: {e:?}"))?;
    let labels = values.into_iter().map(|v| v.clamp(0, u8::MAX as i64) as u8).collect();
    LabelMap::new(w, h, labels)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::Fcn8sConfig;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn test_segment_returns_map_of_image_size() {
        let device = Default::default();
        let model: Fcn8s<B> = Fcn8sConfig::new(3)
            .with_base_channels(2)
            .with_fc_dim(4)
            .init(&device);
        let predictor = Predictor::new(model, device);

        let map = predictor.segment(&RgbImage::new(64, 32)).unwrap();
        assert_eq!((map.width, map.height), (64, 32));
        assert!(map.labels.iter().all(|&c| c < 3));
    }

    #[test]
    fn test_segment_rejects_unaligned_size() {
        let device = Default::default();
        let model: Fcn8s<B> = Fcn8sConfig::new(2)
            .with_base_channels(1)
            .with_fc_dim(2)
            .init(&device);
        let predictor = Predictor::new(model, device);
        assert!(predictor.segment(&RgbImage::new(40, 32)).is_err());
    }

    #[test]
    fn test_label_map_from_tensor() {
        let device = Default::default();
        let t = Tensor::<B, 1, Int>::from_ints([0, 1, 2, 1, 0, 2], &device).reshape([2, 3]);
        let map = label_map_from_tensor(t).unwrap();
        assert_eq!((map.width, map.height), (3, 2));
        assert_eq!(map.labels, vec![0, 1, 2, 1, 0, 2]);
    }
}
