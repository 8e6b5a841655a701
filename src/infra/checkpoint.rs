// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Everything a run leaves in its log directory:
//
//   <log_dir>/
//     model_step_<n>.mpk.gz   ← weights after optimiser step n,
//                                only the newest `max_to_keep` kept
//     latest_step.json        ← step of the newest checkpoint
//     train_config.json       ← hyperparameters + architecture
//     info.txt                ← human-readable hyperparameters
//
// Weights go through Burn's CompactRecorder (MessagePack + gzip,
// half precision). The config is needed to rebuild the exact
// network before its weights can be loaded back in.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::Fcn8s;

const LATEST_FILE: &str = "latest_step.json";
const CONFIG_FILE: &str = "train_config.json";
const INFO_FILE: &str = "info.txt";
const MODEL_PREFIX: &str = "model_step_";

/// Number of weight files kept on disk unless configured otherwise.
pub const DEFAULT_MAX_TO_KEEP: usize = 5;

/// Reads and writes everything under one log directory.
pub struct CheckpointManager {
    /// The log directory itself.
    dir: PathBuf,
    /// How many `model_step_*` files survive a save. 0 keeps all.
    max_to_keep: usize,
}

impl CheckpointManager {
    /// Open (and create if needed) a log directory.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create log directory '{}'", dir.display()))?;
        Ok(Self { dir, max_to_keep: DEFAULT_MAX_TO_KEEP })
    }

    /// Keep only the newest `max_to_keep` weight files (0 keeps all).
    pub fn with_max_to_keep(mut self, max_to_keep: usize) -> Self {
        self.max_to_keep = max_to_keep;
        self
    }

    /// The log directory this manager writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn model_path(&self, step: usize) -> PathBuf {
        self.dir.join(format!("{MODEL_PREFIX}{step}"))
    }

    /// Save weights for `step`, move the latest pointer to it and
    /// drop weight files beyond `max_to_keep`.
    pub fn save_model<B: Backend>(&self, model: &Fcn8s<B>, step: usize) -> Result<()> {
        let path = self.model_path(step);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        fs::write(self.dir.join(LATEST_FILE), serde_json::to_string(&step)?)
            .with_context(|| format!("Failed to write {LATEST_FILE}"))?;

        tracing::debug!("Saved checkpoint: step {}", step);
        self.prune()
    }

    /// Steps of the weight files currently on disk, oldest first.
    pub fn saved_steps(&self) -> Result<Vec<usize>> {
        let mut steps = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read log directory '{}'", self.dir.display()))?
        {
            if let Some(step) = step_of(&entry?.path()) {
                steps.push(step);
            }
        }
        steps.sort_unstable();
        steps.dedup();
        Ok(steps)
    }

    fn prune(&self) -> Result<()> {
        if self.max_to_keep == 0 {
            return Ok(());
        }
        let steps = self.saved_steps()?;
        let excess = steps.len().saturating_sub(self.max_to_keep);
        let stale: Vec<usize> = steps.into_iter().take(excess).collect();
        if stale.is_empty() {
            return Ok(());
        }

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if step_of(&path).is_some_and(|s| stale.contains(&s)) {
                fs::remove_file(&path)
                    .with_context(|| format!("Cannot remove old checkpoint '{}'", path.display()))?;
                tracing::debug!("Removed old checkpoint '{}'", path.display());
            }
        }
        Ok(())
    }

    /// True once at least one checkpoint has been written.
    pub fn has_checkpoint(&self) -> bool {
        self.dir.join(LATEST_FILE).exists()
    }

    /// Step of the newest checkpoint.
    pub fn latest_step(&self) -> Result<usize> {
        let path = self.dir.join(LATEST_FILE);
        let s = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot find '{}'. Have you run 'train' with this log directory?",
                path.display()
            )
        })?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }

    /// Restore the newest checkpoint into `model`, which must have
    /// been built from the same configuration.
    pub fn load_model<B: Backend>(&self, model: Fcn8s<B>, device: &B::Device) -> Result<Fcn8s<B>> {
        let step = self.latest_step()?;
        let path = self.model_path(step);

        tracing::info!("Restoring checkpoint from step {}", step);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;
        Ok(model.load_record(record))
    }

    /// Write `train_config.json`, the description needed to rebuild
    /// the network these weights belong to.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    /// Read back `train_config.json`.
    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'valid'.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Write the hyperparameter log, one `key: value` per line.
    /// Only training runs write it.
    pub fn write_info(&self, cfg: &TrainConfig, mode: &str) -> Result<()> {
        let path = self.dir.join(INFO_FILE);
        fs::write(&path, info_text(cfg, mode))
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        Ok(())
    }
}

/// `model_step_12.mpk.gz` → 12
fn step_of(path: &Path) -> Option<usize> {
    path.file_name()?
        .to_str()?
        .strip_prefix(MODEL_PREFIX)?
        .split('.')
        .next()?
        .parse()
        .ok()
}

fn info_text(cfg: &TrainConfig, mode: &str) -> String {
    let lines = [
        format!("num_steps: {}", cfg.num_steps),
        format!("batch_size: {}", cfg.batch_size),
        format!("learning_rate: {}", cfg.learning_rate),
        format!("momentum: {}", cfg.momentum),
        format!("lr_decay_rate: {}", cfg.lr_decay_rate),
        format!("lr_decay: {}", cfg.lr_decay),
        format!("ckpt_path: {}", cfg.ckpt_path),
        format!("data_dir: {}", cfg.data_dir),
        format!("data_name: {}", cfg.data_name),
        format!("mode: {mode}"),
        format!("optimizer: {}", cfg.optimizer),
    ];
    lines.join("\n")
}
