// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends training summaries to <log_dir>/metrics.csv so the
// learning curve can be plotted after (or during) a run.
//
// Example CSV output:
//   step,learning_rate,loss
//   1,0.000200,1.098612
//   120,0.000200,0.734021
//   ...
//
// The file is appended to, never truncated, so a resumed run
// continues the same curve.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// One summary row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMetrics {
    /// Optimiser steps taken so far.
    pub step:          usize,
    /// Learning rate used for this step.
    pub learning_rate: f64,
    /// Cross-entropy of the batch.
    pub loss:          f64,
}

impl StepMetrics {
    pub fn new(step: usize, learning_rate: f64, loss: f64) -> Self {
        Self { step, learning_rate, loss }
    }
}

/// Appends StepMetrics rows to `metrics.csv`.
pub struct MetricsLogger {
    /// `<log_dir>/metrics.csv`
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Open the CSV in `dir`, writing the header if the file is new.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "step,learning_rate,loss")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one row.
    pub fn log(&self, m: &StepMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;
        writeln!(f, "{},{:.6},{:.6}", m.step, m.learning_rate, m.loss)?;
        Ok(())
    }

    /// Location of the CSV file.
    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
