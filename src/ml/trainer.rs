// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Step-based training: the shuffled data loader is cycled until
// `num_steps` optimiser steps have been taken.
//
//   every step      forward → per-pixel cross-entropy → backward
//                   → optimiser update with the scheduled rate
//   every N secs    summary: log line, CSV row, image/gt/pred PNGs
//   every M secs    checkpoint
//   at the end      final checkpoint
//
// A log directory that already holds a checkpoint is resumed
// from that step. Otherwise the backbone convolutions start
// from the ImageNet weights (unless --from-scratch), and fc6-8
// plus the FCN heads start from their default initialisation.
//
// Weight decay on the optimiser plays the role of the L2
// regularisation term in the total loss.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{bail, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    optim::{
        decay::WeightDecayConfig, momentum::MomentumConfig, AdamConfig, GradientsParams,
        Optimizer, SgdConfig,
    },
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use crate::application::train_use_case::{OptimizerKind, TrainConfig};
use crate::data::{
    batcher::{SegBatch, SegBatcher},
    dataset::SegDataset,
    preprocessor::from_chw,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{MetricsLogger, StepMetrics},
    pretrained::load_vgg16_features,
    visualize::{save_gray_png, save_png, to_gray},
};
use crate::ml::{
    model::{logits_to_labels, Fcn8s},
    predictor::label_map_from_tensor,
    schedule::LearningRate,
    TrainBackend,
};

/// Train on the default device of the configured backend.
/// Returns the loss of the last batch.
pub fn run_training(
    cfg:          &TrainConfig,
    dataset:      SegDataset,
    ckpt_manager: &CheckpointManager,
) -> Result<f64> {
    let device = <TrainBackend as Backend>::Device::default();
    tracing::info!("Using device: {:?}", device);
    train_loop::<TrainBackend>(cfg, dataset, ckpt_manager, device)
}

pub fn train_loop<B: AutodiffBackend>(
    cfg:          &TrainConfig,
    dataset:      SegDataset,
    ckpt_manager: &CheckpointManager,
    device:       B::Device,
) -> Result<f64> {
    let num_samples = dataset.sample_count();
    if num_samples == 0 {
        bail!("cannot train on an empty dataset");
    }

    // ── Build / restore model ─────────────────────────────────────────────────
    let mut model: Fcn8s<B> = cfg.model_config().init(&device);
    let mut start_step = 0;

    if ckpt_manager.has_checkpoint() {
        start_step = ckpt_manager.latest_step()?;
        model = ckpt_manager.load_model(model, &device)?;
        if start_step >= cfg.num_steps {
            bail!(
                "checkpoint in '{}' is already at step {} (num_steps {}), nothing to train",
                ckpt_manager.dir().display(),
                start_step,
                cfg.num_steps
            );
        }
        tracing::info!("Resuming training at step {}", start_step);
    } else if cfg.from_scratch {
        tracing::warn!("Training from scratch, no pretrained backbone");
    } else {
        model = load_vgg16_features(model, Path::new(&cfg.ckpt_path), cfg.base_channels, &device)?;
    }

    let session = TrainSession {
        cfg,
        ckpt_manager,
        metrics:     MetricsLogger::new(ckpt_manager.dir())?,
        schedule:    LearningRate::new(
            cfg.learning_rate,
            cfg.lr_decay,
            cfg.lr_decay_rate,
            num_samples,
            cfg.batch_size,
        ),
        summary_dir: ckpt_manager.dir().join("summaries"),
    };
    tracing::info!(
        "Training {} samples for {} steps with {} (schedule {:?})",
        num_samples,
        cfg.num_steps,
        cfg.optimizer,
        session.schedule
    );
    tracing::info!("Step metrics -> '{}'", session.metrics.csv_path().display());

    // ── Optimiser ─────────────────────────────────────────────────────────────
    let weight_decay = (cfg.weight_decay > 0.0).then(|| WeightDecayConfig::new(cfg.weight_decay as f32));

    match cfg.optimizer {
        OptimizerKind::Adam => {
            let optim = AdamConfig::new().with_weight_decay(weight_decay).init();
            session.run(model, optim, dataset, start_step, device)
        }
        OptimizerKind::Momentum => {
            let optim = SgdConfig::new()
                .with_momentum(Some(MomentumConfig::new().with_momentum(cfg.momentum)))
                .with_weight_decay(weight_decay)
                .init();
            session.run(model, optim, dataset, start_step, device)
        }
    }
}

struct TrainSession<'a> {
    cfg:          &'a TrainConfig,
    ckpt_manager: &'a CheckpointManager,
    metrics:      MetricsLogger,
    schedule:     LearningRate,
    summary_dir:  PathBuf,
}

impl TrainSession<'_> {
    fn run<B, O>(
        &self,
        mut model:  Fcn8s<B>,
        mut optim:  O,
        dataset:    SegDataset,
        start_step: usize,
        device:     B::Device,
    ) -> Result<f64>
    where
        B: AutodiffBackend,
        O: Optimizer<Fcn8s<B>, B>,
    {
        let cfg = self.cfg;

        let mut builder = DataLoaderBuilder::new(SegBatcher::<B>::new(device))
            .batch_size(cfg.batch_size)
            .shuffle(cfg.seed);
        if cfg.num_workers > 0 {
            builder = builder.num_workers(cfg.num_workers);
        }
        let loader = builder.build(dataset);

        let summary_every = Duration::from_secs(cfg.summary_secs);
        let save_every    = Duration::from_secs(cfg.save_secs);
        let mut last_summary: Option<Instant> = None;
        let mut last_save = Instant::now();

        let mut step      = start_step;
        let mut last_loss = f64::NAN;

        while step < cfg.num_steps {
            let mut batches = 0usize;

            for batch in loader.iter() {
                if step >= cfg.num_steps {
                    break;
                }
                batches += 1;

                let lr = self.schedule.at(step);
                let (loss, logits) = model.forward_loss(batch.images.clone(), batch.labels.clone());
                last_loss = loss.clone().into_scalar().elem::<f64>();

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(lr, model, grads);
                step += 1;

                if last_summary.map_or(true, |t| t.elapsed() >= summary_every) {
                    self.summarize(step, lr, last_loss, &batch, logits)?;
                    last_summary = Some(Instant::now());
                }
                if last_save.elapsed() >= save_every {
                    self.ckpt_manager.save_model(&model, step)?;
                    tracing::info!("Checkpoint saved at step {}", step);
                    last_save = Instant::now();
                }
            }

            if batches == 0 {
                bail!("data loader produced no batches");
            }
        }

        self.ckpt_manager.save_model(&model, step)?;
        tracing::info!("Final checkpoint saved at step {}", step);
        Ok(last_loss)
    }

    /// Log the step and dump the first sample of the batch as
    /// image / ground truth / prediction PNGs.
    fn summarize<B: Backend>(
        &self,
        step:   usize,
        lr:     f64,
        loss:   f64,
        batch:  &SegBatch<B>,
        logits: Tensor<B, 4>,
    ) -> Result<()> {
        tracing::info!("step {:>6}/{} | lr={:.3e} | loss={:.4}", step, self.cfg.num_steps, lr, loss);
        self.metrics.log(&StepMetrics::new(step, lr, loss))?;

        let [_, _, h, w] = batch.images.dims();
        let pixels: Vec<f32> = batch
            .images
            .clone()
            .slice([0..1, 0..3, 0..h, 0..w])
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("Cannot read image tensor: {e:?}"))?;
        let gt   = label_map_from_tensor(batch.labels.clone().slice([0..1, 0..h, 0..w]).reshape([h, w]))?;
        let pred = label_map_from_tensor(logits_to_labels(logits.detach()).slice([0..1, 0..h, 0..w]).reshape([h, w]))?;

        fs::create_dir_all(&self.summary_dir)?;
        save_png(&from_chw(&pixels, h, w), &self.summary_dir.join(format!("step_{step}_image.png")))?;
        save_gray_png(&to_gray(&gt), &self.summary_dir.join(format!("step_{step}_gt.png")))?;
        save_gray_png(&to_gray(&pred), &self.summary_dir.join(format!("step_{step}_pred.png")))?;
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocessor::Preprocessor;
    use crate::domain::{label_map::LabelMap, sample::SegSample};
    use burn::backend::{Autodiff, NdArray};
    use image::RgbImage;

    type AB = Autodiff<NdArray>;

    fn tiny_config(log_dir: &Path, optimizer: OptimizerKind, num_steps: usize) -> TrainConfig {
        TrainConfig {
            num_steps,
            batch_size:    2,
            num_classes:   3,
            learning_rate: 1e-3,
            optimizer,
            from_scratch:  true,
            log_dir:       log_dir.display().to_string(),
            image_height:  32,
            image_width:   32,
            base_channels: 2,
            fc_dim:        4,
            dropout:       0.0,
            flip_prob:     0.5,
            num_workers:   0,
            summary_secs:  0,
            save_secs:     3600,
            ..TrainConfig::default()
        }
    }

    fn dataset(n: usize) -> SegDataset {
        let samples = (0..n)
            .map(|i| {
                let label = LabelMap::filled(32, 32, (i % 3) as u8);
                SegSample::new(format!("s{i}"), RgbImage::new(32, 32), label).unwrap()
            })
            .collect();
        SegDataset::new(samples, Preprocessor::new(32, 32, 0.5))
    }

    #[test]
    fn test_runs_requested_steps_and_checkpoints() {
        let dir  = tempfile::tempdir().unwrap();
        let cfg  = tiny_config(dir.path(), OptimizerKind::Adam, 3);
        let ckpt = CheckpointManager::new(dir.path()).unwrap();

        // 3 samples, batch 2 → the loader has to be cycled to reach 3 steps
        let loss = train_loop::<AB>(&cfg, dataset(3), &ckpt, Default::default()).unwrap();
        assert!(loss.is_finite());
        assert_eq!(ckpt.latest_step().unwrap(), 3);
        assert!(dir.path().join("metrics.csv").exists());
        assert!(dir.path().join("summaries/step_1_pred.png").exists());
    }

    #[test]
    fn test_resumes_from_latest_step() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();

        let cfg = tiny_config(dir.path(), OptimizerKind::Momentum, 2);
        train_loop::<AB>(&cfg, dataset(2), &ckpt, Default::default()).unwrap();
        assert_eq!(ckpt.latest_step().unwrap(), 2);

        let cfg = tiny_config(dir.path(), OptimizerKind::Momentum, 4);
        train_loop::<AB>(&cfg, dataset(2), &ckpt, Default::default()).unwrap();
        assert_eq!(ckpt.latest_step().unwrap(), 4);
    }

    #[test]
    fn test_finished_log_dir_is_error() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let cfg  = tiny_config(dir.path(), OptimizerKind::Adam, 2);

        let loss = train_loop::<AB>(&cfg, dataset(2), &ckpt, Default::default()).unwrap();
        assert!(loss.is_finite());

        let err = train_loop::<AB>(&cfg, dataset(2), &ckpt, Default::default()).unwrap_err();
        assert!(err.to_string().contains("already at step 2"), "{err}");
        assert_eq!(ckpt.latest_step().unwrap(), 2);
    }

    #[test]
    fn test_timed_saves_keep_newest_five() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let cfg  = TrainConfig { save_secs: 0, summary_secs: 3600, ..tiny_config(dir.path(), OptimizerKind::Adam, 8) };

        train_loop::<AB>(&cfg, dataset(2), &ckpt, Default::default()).unwrap();
        assert_eq!(ckpt.saved_steps().unwrap(), vec![4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_empty_dataset_is_error() {
        let dir  = tempfile::tempdir().unwrap();
        let cfg  = tiny_config(dir.path(), OptimizerKind::Adam, 1);
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        assert!(train_loop::<AB>(&cfg, dataset(0), &ckpt, Default::default()).is_err());
    }
}
