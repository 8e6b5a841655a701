// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Validate the configuration
//   Step 2: Load the `train` split            (Layer 4 - data)
//   Step 3: Resize and check class ids        (Layer 4 - data)
//   Step 4: Build the Burn dataset            (Layer 4 - data)
//   Step 5: Check resume, write info + config (Layer 6 - infra)
//   Step 6: Run the training loop             (Layer 5 - ml)

use anyhow::{bail, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::{dataset::SegDataset, loader::SegFolderLoader, preprocessor::Preprocessor};
use crate::domain::{sample::SegSample, traits::SampleSource};
use crate::infra::checkpoint::{CheckpointManager, DEFAULT_MAX_TO_KEEP};
use crate::ml::{
    model::{validate_input_size, Fcn8sConfig},
    trainer::{run_training, train_loop},
};

pub const TRAIN_SPLIT: &str = "train";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam,
    Momentum,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adam     => write!(f, "Adam"),
            Self::Momentum => write!(f, "momentum"),
        }
    }
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters of a run. Saved as train_config.json so
// validation can rebuild the same network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Optimiser steps to reach, counted across resumes.
    pub num_steps:     usize,
    pub batch_size:    usize,
    /// Number of classes including background; every label id must be below it.
    pub num_classes:   usize,
    /// Initial learning rate.
    pub learning_rate: f64,
    /// Momentum term for `OptimizerKind::Momentum`.
    pub momentum:      f64,
    /// Factor applied to the learning rate every two epochs.
    pub lr_decay_rate: f64,
    /// Staircase decay on or off.
    pub lr_decay:      bool,
    pub optimizer:     OptimizerKind,
    /// L2 penalty on the weights.
    pub weight_decay:  f64,
    /// torchvision VGG-16 `.pth` used to initialise the backbone.
    pub ckpt_path:     String,
    /// Start from random weights instead of `ckpt_path`.
    pub from_scratch:  bool,
    /// Directory for checkpoints, summaries, metrics.csv and info.txt.
    pub log_dir:       String,
    /// Root holding one directory per dataset.
    pub data_dir:      String,
    /// Dataset directory under `data_dir`.
    pub data_name:     String,
    /// Training height, a multiple of 32.
    pub image_height:  usize,
    /// Training width, a multiple of 32.
    pub image_width:   usize,
    /// Width of the first VGG block.
    pub base_channels: usize,
    /// Channels of fc6 / fc7.
    pub fc_dim:        usize,
    /// Dropout after fc6 / fc7 during training.
    pub dropout:       f64,
    /// Probability of a horizontal flip per training sample.
    pub flip_prob:     f64,
    /// Data loader worker threads; 0 loads on the training thread.
    pub num_workers:   usize,
    /// Shuffle seed of the data loader.
    pub seed:          u64,
    /// Seconds between summaries.
    pub summary_secs:  u64,
    /// Seconds between checkpoints.
    pub save_secs:     u64,
    /// Weight files kept in `log_dir`; 0 keeps every one.
    #[serde(default = "default_max_to_keep")]
    pub max_to_keep:   usize,
}

fn default_max_to_keep() -> usize {
    DEFAULT_MAX_TO_KEEP
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            num_steps:     50_000,
            batch_size:    2,
            num_classes:   3,
            learning_rate: 2e-4,
            momentum:      0.99,
            lr_decay_rate: 0.99,
            lr_decay:      true,
            optimizer:     OptimizerKind::Adam,
            weight_decay:  5e-4,
            ckpt_path:     "vgg16.pth".to_string(),
            from_scratch:  false,
            log_dir:       "ckpt".to_string(),
            data_dir:      "data".to_string(),
            data_name:     "Cityscapes".to_string(),
            image_height:  224,
            image_width:   224,
            base_channels: 64,
            fc_dim:        4096,
            dropout:       0.5,
            flip_prob:     0.5,
            num_workers:   2,
            seed:          42,
            summary_secs:  120,
            save_secs:     240,
            max_to_keep:   DEFAULT_MAX_TO_KEEP,
        }
    }
}

impl TrainConfig {
    pub fn model_config(&self) -> Fcn8sConfig {
        Fcn8sConfig::new(self.num_classes)
            .with_base_channels(self.base_channels)
            .with_fc_dim(self.fc_dim)
            .with_dropout(self.dropout)
    }

    pub fn preprocessor(&self, flip_prob: f64) -> Preprocessor {
        Preprocessor::new(self.image_height as u32, self.image_width as u32, flip_prob)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.num_classes < 2 || self.num_classes > u8::MAX as usize + 1 {
            bail!("num_classes must be between 2 and 256, got {}", self.num_classes);
        }
        if !(self.learning_rate > 0.0) {
            bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must be in [0, 1), got {}", self.dropout);
        }
        if self.base_channels == 0 || self.fc_dim == 0 {
            bail!("base_channels and fc_dim must be non-zero");
        }
        validate_input_size(self.image_height, self.image_width)
    }

    /// Fail when `saved` describes a network with different shapes,
    /// so its weights cannot be loaded into this one.
    pub fn ensure_same_architecture(&self, saved: &TrainConfig) -> Result<()> {
        let fields = [
            ("num_classes",   saved.num_classes,   self.num_classes),
            ("base_channels", saved.base_channels, self.base_channels),
            ("fc_dim",        saved.fc_dim,        self.fc_dim),
        ];
        let diffs: Vec<String> = fields
            .iter()
            .filter(|(_, old, new)| old != new)
            .map(|(name, old, new)| format!("{name} {old} -> {new}"))
            .collect();
        if !diffs.is_empty() {
            bail!(
                "log directory '{}' holds checkpoints of a different network ({}); \
                 use a new --log-dir or the original settings",
                self.log_dir,
                diffs.join(", ")
            );
        }
        Ok(())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Run the full pipeline on the default backend.
    /// Returns the loss of the final batch.
    pub fn execute(&self) -> Result<f64> {
        let (dataset, ckpt_manager) = self.prepare()?;
        run_training(&self.config, dataset, &ckpt_manager)
    }

    /// Same pipeline on an explicit backend and device.
    pub fn execute_on<B: AutodiffBackend>(&self, device: B::Device) -> Result<f64> {
        let (dataset, ckpt_manager) = self.prepare()?;
        train_loop::<B>(&self.config, dataset, &ckpt_manager, device)
    }

    fn prepare(&self) -> Result<(SegDataset, CheckpointManager)> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Load the training split ───────────────────────────────────
        let loader  = SegFolderLoader::new(&cfg.data_dir, &cfg.data_name, TRAIN_SPLIT);
        let samples = loader.load_all()?;
        if samples.is_empty() {
            bail!("no training samples found in '{}'", loader.split_dir().display());
        }

        // ── Step 3: Resize once, check labels ─────────────────────────────────
        let resize  = cfg.preprocessor(0.0);
        let samples = samples
            .iter()
            .map(|s| resize.resize(s))
            .collect::<Result<Vec<_>>>()?;
        check_class_ids(&samples, cfg.num_classes)?;
        tracing::info!("Pixels per class: {:?}", class_totals(&samples, cfg.num_classes));

        // ── Step 4: Dataset with augmentation ─────────────────────────────────
        let dataset = SegDataset::new(samples, cfg.preprocessor(cfg.flip_prob));
        tracing::info!("Training set: {} samples", dataset.sample_count());

        // ── Step 5: Record hyperparameters ────────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.log_dir)?.with_max_to_keep(cfg.max_to_keep);
        if ckpt_manager.has_checkpoint() {
            cfg.ensure_same_architecture(&ckpt_manager.load_config()?)?;
        }
        ckpt_manager.write_info(cfg, TRAIN_SPLIT)?;
        ckpt_manager.save_config(cfg)?;

        Ok((dataset, ckpt_manager))
    }
}

/// Every ground-truth id must be a valid class index, otherwise the
/// cross-entropy target would point outside the logits.
fn check_class_ids(samples: &[SegSample], num_classes: usize) -> Result<()> {
    for sample in samples {
        if let Some(max) = sample.label.max_class() {
            if max as usize >= num_classes {
                bail!(
                    "label of '{}' contains class {} but num_classes is {}",
                    sample.source,
                    max,
                    num_classes
                );
            }
        }
    }
    Ok(())
}

fn class_totals(samples: &[SegSample], num_classes: usize) -> Vec<usize> {
    let mut totals = vec![0usize; num_classes];
    for sample in samples {
        for (total, n) in totals.iter_mut().zip(sample.label.class_counts(num_classes)) {
            *total += n;
        }
    }
    totals
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::label_map::LabelMap;
    use image::RgbImage;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_settings() {
        let bad = [
            TrainConfig { batch_size: 0, ..TrainConfig::default() },
            TrainConfig { num_classes: 1, ..TrainConfig::default() },
            TrainConfig { image_height: 200, ..TrainConfig::default() },
            TrainConfig { dropout: 1.0, ..TrainConfig::default() },
            TrainConfig { learning_rate: 0.0, ..TrainConfig::default() },
        ];
        for cfg in bad {
            assert!(cfg.validate().is_err(), "{cfg:?} should be rejected");
        }
    }

    #[test]
    fn test_class_id_check() {
        let sample = SegSample::new(
            "a",
            RgbImage::new(2, 1),
            LabelMap::new(2, 1, vec![0, 3]).unwrap(),
        )
        .unwrap();
        assert!(check_class_ids(std::slice::from_ref(&sample), 4).is_ok());
        assert!(check_class_ids(&[sample], 3).is_err());
    }

    #[test]
    fn test_class_totals() {
        let a = SegSample::new("a", RgbImage::new(2, 1), LabelMap::new(2, 1, vec![0, 2]).unwrap()).unwrap();
        let b = SegSample::new("b", RgbImage::new(2, 1), LabelMap::filled(2, 1, 2)).unwrap();
        assert_eq!(class_totals(&[a, b], 3), vec![1, 0, 3]);
    }

    #[test]
    fn test_architecture_check_names_changed_fields() {
        let saved = TrainConfig::default();
        assert!(saved.ensure_same_architecture(&saved).is_ok());

        let wider = TrainConfig { base_channels: 32, learning_rate: 1e-3, ..TrainConfig::default() };
        let err = wider.ensure_same_architecture(&saved).unwrap_err().to_string();
        assert!(err.contains("base_channels 64 -> 32"), "{err}");

        // non-architecture settings may change between runs
        let tuned = TrainConfig { learning_rate: 1e-3, num_steps: 10, ..TrainConfig::default() };
        assert!(tuned.ensure_same_architecture(&saved).is_ok());
    }

    fn write_train_split(root: &std::path::Path, n: usize) {
        let images = root.join("toy/train/images");
        let labels = root.join("toy/train/labels");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::create_dir_all(&labels).unwrap();
        for i in 0..n {
            RgbImage::new(32, 32).save(images.join(format!("{i}.png"))).unwrap();
            image::GrayImage::from_fn(32, 32, |x, _| image::Luma([(x % 3) as u8]))
                .save(labels.join(format!("{i}.png")))
                .unwrap();
        }
    }

    fn tiny_config(data: &std::path::Path, log: &std::path::Path) -> TrainConfig {
        TrainConfig {
            num_steps:     1,
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
    fn test_resume_with_other_network_keeps_saved_config() {
        use burn::backend::{Autodiff, NdArray};

        let data = tempfile::tempdir().unwrap();
        let log  = tempfile::tempdir().unwrap();
        write_train_split(data.path(), 2);

        let first = tiny_config(data.path(), log.path());
        TrainUseCase::new(first).execute_on::<Autodiff<NdArray>>(Default::default()).unwrap();

        let wider = TrainConfig { num_steps: 2, base_channels: 4, ..tiny_config(data.path(), log.path()) };
        let result = TrainUseCase::new(wider).execute_on::<Autodiff<NdArray>>(Default::default());
        assert!(result.is_err());

        let saved = CheckpointManager::new(log.path()).unwrap().load_config().unwrap();
        assert_eq!(saved.base_channels, 2);
    }

    #[test]
    fn test_optimizer_names() {
        assert_eq!(OptimizerKind::Adam.to_string(), "Adam");
        assert_eq!(OptimizerKind::Momentum.to_string(), "momentum");
    }
}
