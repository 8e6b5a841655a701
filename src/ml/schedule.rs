// ============================================================
// Layer 5 — Learning Rate Schedule
// ============================================================
// Either a constant rate or a staircase exponential decay:
//
//   lr(step) = initial · decay_rate ^ floor(step / decay_steps)
//
// The decay period is two epochs' worth of optimiser steps,
// so the rate drops once every two passes over the data.

use serde::{Deserialize, Serialize};

/// Epochs between two decay steps.
pub const EPOCHS_BEFORE_DECAY: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LearningRate {
    Constant(f64),
    ExponentialDecay {
        initial:     f64,
        decay_rate:  f64,
        decay_steps: usize,
    },
}

impl LearningRate {
    /// Build the schedule for a dataset of `num_samples` trained with
    /// `batch_size` samples per step.
    pub fn new(
        initial:     f64,
        decay:       bool,
        decay_rate:  f64,
        num_samples: usize,
        batch_size:  usize,
    ) -> Self {
        if !decay {
            return Self::Constant(initial);
        }
        Self::ExponentialDecay {
            initial,
            decay_rate,
            decay_steps: decay_steps(num_samples, batch_size),
        }
    }

    pub fn at(&self, step: usize) -> f64 {
        match *self {
            Self::Constant(lr) => lr,
            Self::ExponentialDecay { initial, decay_rate, decay_steps } => {
                let exponent = (step / decay_steps.max(1)) as i32;
                initial * decay_rate.powi(exponent)
            }
        }
    }
}

/// Optimiser steps in two epochs, never less than one.
pub fn decay_steps(num_samples: usize, batch_size: usize) -> usize {
    let batches_per_epoch = num_samples as f64 / batch_size.max(1) as f64;
    ((EPOCHS_BEFORE_DECAY * batches_per_epoch) as usize).max(1)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant() {
        let lr = LearningRate::new(2e-4, false, 0.5, 100, 2);
        assert_eq!(lr.at(0), 2e-4);
        assert_eq!(lr.at(10_000), 2e-4);
    }

    #[test]
    fn test_decay_steps_is_two_epochs() {
        assert_eq!(decay_steps(100, 2), 100);
        assert_eq!(decay_steps(5, 2), 5);
        assert_eq!(decay_steps(0, 2), 1);
    }

    #[test]
    fn test_staircase() {
        let lr = LearningRate::new(1.0, true, 0.5, 10, 2); // decay every 10 steps
        assert_eq!(lr.at(0), 1.0);
        assert_eq!(lr.at(9), 1.0);
        assert_eq!(lr.at(10), 0.5);
        assert_eq!(lr.at(25), 0.25);
    }
}
