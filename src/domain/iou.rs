// ============================================================
// Layer 3 — Intersection-over-Union
// ============================================================
// IOU for a single class compares the set of pixels labelled
// `label` in the ground truth with the set predicted as `label`:
//
//            |GT ∩ PRED|
//   IOU  =  -------------
//            |GT ∪ PRED|
//
// When the class is absent from both maps the union is empty
// and the score is undefined. We return None in that case and
// leave the sample out of the class average instead of letting
// a 0/0 poison the running sum.

use anyhow::{bail, Result};

use crate::domain::label_map::LabelMap;

/// IOU of one class between a ground-truth and a predicted map.
pub fn iou_for_label(gt: &LabelMap, pred: &LabelMap, label: u8) -> Result<Option<f64>> {
    if gt.width != pred.width || gt.height != pred.height {
        bail!(
            "label maps differ in size: gt {}x{}, pred {}x{}",
            gt.width,
            gt.height,
            pred.width,
            pred.height
        );
    }

    let mut intersection = 0usize;
    let mut union        = 0usize;
    for (&g, &p) in gt.labels.iter().zip(pred.labels.iter()) {
        let in_gt   = g == label;
        let in_pred = p == label;
        if in_gt && in_pred {
            intersection += 1;
        }
        if in_gt || in_pred {
            union += 1;
        }
    }

    if union == 0 {
        return Ok(None);
    }
    Ok(Some(intersection as f64 / union as f64))
}

// ─── IouAccumulator ───────────────────────────────────────────────────────────
/// Running per-class IOU over a validation pass.
///
/// Each class keeps the sum of its defined per-sample scores and
/// how many samples contributed, so the final value is the mean
/// per-image IOU of that class.
#[derive(Debug, Clone)]
pub struct IouAccumulator {
    sums:   Vec<f64>,
    counts: Vec<usize>,
}

impl IouAccumulator {
    pub fn new(num_classes: usize) -> Self {
        Self {
            sums:   vec![0.0; num_classes],
            counts: vec![0; num_classes],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.sums.len()
    }

    /// Score one sample against every class.
    pub fn add(&mut self, gt: &LabelMap, pred: &LabelMap) -> Result<()> {
        for class in 0..self.num_classes() {
            if let Some(score) = iou_for_label(gt, pred, class as u8)? {
                self.sums[class]   += score;
                self.counts[class] += 1;
            }
        }
        Ok(())
    }

    /// Mean IOU of one class, None if it never appeared.
    pub fn class_iou(&self, class: usize) -> Option<f64> {
        match self.counts.get(class) {
            Some(&n) if n > 0 => Some(self.sums[class] / n as f64),
            _ => None,
        }
    }

    pub fn per_class(&self) -> Vec<Option<f64>> {
        (0..self.num_classes()).map(|c| self.class_iou(c)).collect()
    }

    /// Mean over the classes that have a defined score.
    pub fn mean_iou(&self) -> Option<f64> {
        let defined: Vec<f64> = self.per_class().into_iter().flatten().collect();
        if defined.is_empty() {
            None
        } else {
            Some(defined.iter().sum::<f64>() / defined.len() as f64)
        }
    }
}
