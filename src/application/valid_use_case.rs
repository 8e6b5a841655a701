// ============================================================
// Layer 2 — ValidUseCase
// ============================================================
// Scores a trained checkpoint against the `valid` split:
//
//   Step 1: Restore config + weights        (Layer 6 - infra)
//   Step 2: Load and resize the split       (Layer 4 - data)
//   Step 3: Segment every image             (Layer 5 - ml)
//   Step 4: Accumulate IOU                  (Layer 3 - domain)
//   Step 5: Write overlay PNGs to eval/     (Layer 6 - infra)

use anyhow::{bail, Context, Result};
use burn::prelude::*;
use std::{fs, time::Instant};

use crate::data::loader::SegFolderLoader;
use crate::domain::{
    iou::{iou_for_label, IouAccumulator},
    traits::{SampleSource, Segmenter},
};
use crate::infra::{
    checkpoint::CheckpointManager,
    visualize::{compose_overlay, eval_file_name, save_png},
};
use crate::ml::{predictor::Predictor, InnerBackend};

pub const VALID_SPLIT: &str = "valid";

/// Label whose IOU is reported on its own ("foreground").
pub const DEFAULT_IOU_LABEL: u8 = 2;

#[derive(Debug, Clone)]
pub struct ValidConfig {
    pub log_dir:   String,
    /// Overrides the data directory recorded at training time.
    pub data_dir:  Option<String>,
    /// Overrides the dataset name recorded at training time.
    pub data_name: Option<String>,
    pub iou_label: u8,
}

impl ValidConfig {
    pub fn new(log_dir: impl Into<String>) -> Self {
        Self {
            log_dir:   log_dir.into(),
            data_dir:  None,
            data_name: None,
            iou_label: DEFAULT_IOU_LABEL,
        }
    }
}

/// Outcome of a validation run.
#[derive(Debug, Clone)]
pub struct ValidReport {
    pub num_samples:      usize,
    /// Mean wall-clock seconds spent per image (prediction + overlay).
    pub time_per_image:   f64,
    pub per_class:        Vec<Option<f64>>,
    pub foreground_label: u8,
    pub foreground_iou:   Option<f64>,
    pub mean_iou:         Option<f64>,
}

pub struct ValidUseCase {
    config: ValidConfig,
}

impl ValidUseCase {
    pub fn new(config: ValidConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<ValidReport> {
        let device = <InnerBackend as Backend>::Device::default();
        tracing::info!("Using device: {:?}", device);
        self.execute_with::<InnerBackend>(device)
    }

    pub fn execute_with<B: Backend>(&self, device: B::Device) -> Result<ValidReport> {
        let vc = &self.config;

        // ── Step 1: Restore ───────────────────────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&vc.log_dir)?;
        if !ckpt_manager.has_checkpoint() {
            bail!("no checkpoint found in '{}', run `train` first", vc.log_dir);
        }
        let mut train_cfg = ckpt_manager.load_config()?;
        if let Some(dir) = &vc.data_dir {
            train_cfg.data_dir = dir.clone();
        }
        if let Some(name) = &vc.data_name {
            train_cfg.data_name = name.clone();
        }
        if vc.iou_label as usize >= train_cfg.num_classes {
            tracing::warn!(
                "iou_label {} is outside the {} trained classes",
                vc.iou_label,
                train_cfg.num_classes
            );
        }
        let predictor = Predictor::<B>::from_checkpoint(&ckpt_manager, device)?;

        // ── Step 2: Load ──────────────────────────────────────────────────────
        let loader  = SegFolderLoader::new(&train_cfg.data_dir, &train_cfg.data_name, VALID_SPLIT);
        let samples = loader.load_all()?;
        if samples.is_empty() {
            bail!("no validation samples found in '{}'", loader.split_dir().display());
        }
        let resize = train_cfg.preprocessor(0.0);

        let eval_dir = ckpt_manager.dir().join("eval");
        fs::create_dir_all(&eval_dir)
            .with_context(|| format!("Cannot create '{}'", eval_dir.display()))?;

        // ── Steps 3-5: Segment, score, draw ───────────────────────────────────
        let total   = samples.len();
        let mut acc = IouAccumulator::new(train_cfg.num_classes);
        let mut foreground = Vec::new();
        let started = Instant::now();

        for (i, sample) in samples.iter().enumerate() {
            let sample = resize.resize(sample)?;
            let pred   = predictor.segment(&sample.image)?;

            acc.add(&sample.label, &pred)?;
            if let Some(iou) = iou_for_label(&sample.label, &pred, vc.iou_label)? {
                foreground.push(iou);
            }

            let overlay = compose_overlay(&sample.image, &sample.label, &pred)?;
            save_png(&overlay, &eval_dir.join(eval_file_name(VALID_SPLIT, i, total)))?;
            tracing::debug!("[{}/{}] {}", i + 1, total, sample.source);
        }

        let time_per_image = started.elapsed().as_secs_f64() / total as f64;
        let foreground_iou = (!foreground.is_empty())
            .then(|| foreground.iter().sum::<f64>() / foreground.len() as f64);

        tracing::info!("Validated {} images, overlays in '{}'", total, eval_dir.display());
        Ok(ValidReport {
            num_samples: total,
            time_per_image,
            per_class: acc.per_class(),
            foreground_label: vc.iou_label,
            foreground_iou,
            mean_iou: acc.mean_iou(),
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{TrainConfig, TrainUseCase};
    use burn::backend::{Autodiff, NdArray};
    use image::{GrayImage, Luma, RgbImage};
    use std::path::Path;

    fn write_split(root: &Path, split: &str, n: usize) {
        let images = root.join("toy").join(split).join("images");
        let labels = root.join("toy").join(split).join("labels");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&labels).unwrap();
        for i in 0..n {
            RgbImage::from_fn(40, 36, |x, _| image::Rgb([(x * 6) as u8, 100, 200]))
                .save(images.join(format!("{i:03}.png")))
                .unwrap();
            GrayImage::from_fn(40, 36, |x, _| Luma([if x < 20 { 0 } else { 2 }]))
                .save(labels.join(format!("{i:03}.png")))
                .unwrap();
        }
    }

    fn tiny_train_config(data: &Path, log: &Path) -> TrainConfig {
        TrainConfig {
            num_steps:     2,
            batch_size:    2,
            num_classes:   3,
            learning_rate: 1e-3,
            from_scratch:  true,
            log_dir:       log.display().to_string(),
            data_dir:      data.display().to_string(),
            data_name:     "toy".to_string(),
            image_height:  32,
            image_width:   32,
            base_channels: 2,
            fc_dim:        4,
            dropout:       0.0,
            num_workers:   0,
            summary_secs:  3600,
            save_secs:     3600,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_train_then_validate() {
        let data = tempfile::tempdir().unwrap();
        let log  = tempfile::tempdir().unwrap();
        write_split(data.path(), "train", 3);
        write_split(data.path(), "valid", 2);

        let train = TrainUseCase::new(tiny_train_config(data.path(), log.path()));
        let loss  = train.execute_on::<Autodiff<NdArray>>(Default::default()).unwrap();
        assert!(loss.is_finite());
        assert!(log.path().join("info.txt").exists());

        let valid  = ValidUseCase::new(ValidConfig::new(log.path().display().to_string()));
        let report = valid.execute_with::<NdArray>(Default::default()).unwrap();

        assert_eq!(report.num_samples, 2);
        assert_eq!(report.per_class.len(), 3);
        assert_eq!(report.foreground_label, 2);
        assert!(report.mean_iou.map_or(true, |m| (0.0..=1.0).contains(&m)));
        assert!(log.path().join("eval/valid0.png").exists());
        assert!(log.path().join("eval/valid1.png").exists());

        // info.txt stays the record of the training run
        let info = fs::read_to_string(log.path().join("info.txt")).unwrap();
        assert!(info.contains("mode: train"));
        assert!(!info.contains("mode: valid"));
    }

    #[test]
    fn test_missing_checkpoint_is_error() {
        let log = tempfile::tempdir().unwrap();
        let valid = ValidUseCase::new(ValidConfig::new(log.path().display().to_string()));
        assert!(valid.execute_with::<NdArray>(Default::default()).is_err());
    }

    #[test]
    fn test_empty_valid_split_is_error() {
        let data = tempfile::tempdir().unwrap();
        let log  = tempfile::tempdir().unwrap();
        write_split(data.path(), "train", 2);
        write_split(data.path(), "valid", 0);

        TrainUseCase::new(tiny_train_config(data.path(), log.path()))
            .execute_on::<Autodiff<NdArray>>(Default::default())
            .unwrap();

        let info_before = fs::read_to_string(log.path().join("info.txt")).unwrap();
        let valid = ValidUseCase::new(ValidConfig::new(log.path().display().to_string()));
        assert!(valid.execute_with::<NdArray>(Default::default()).is_err());
        assert_eq!(fs::read_to_string(log.path().join("info.txt")).unwrap(), info_before);
    }
}
