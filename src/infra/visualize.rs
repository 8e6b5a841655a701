// ============================================================
// Layer 6 — Visualisation
// ============================================================
// Turns label maps into pictures a human can check.
//
// Class ids are spread out by ×80 (0, 80, 160, 240, ...) and
// then pushed through a JET colormap, so background is dark
// blue and the first classes land on cyan/yellow/red.
//
// The validation overlay is three panels side by side:
//
//   ┌──────────────────────┬──────────────┬──────────────┐
//   │ 0.8·image+0.2·pred   │ jet(gt)      │ jet(pred)    │
//   └──────────────────────┴──────────────┴──────────────┘

use anyhow::{bail, Context, Result};
use image::{GrayImage, Luma, Rgb, RgbImage};
use std::path::Path;

use crate::domain::label_map::LabelMap;

/// Spacing between class ids in the rendered images.
pub const LABEL_SCALE: u8 = 80;
const IMAGE_WEIGHT: f32 = 0.8;
const PRED_WEIGHT: f32 = 0.2;

/// JET colormap: 0 → dark blue, 128 → green-ish, 255 → dark red.
pub fn jet(value: u8) -> Rgb<u8> {
    let x = value as f32 / 255.0;
    let channel = |center: f32| -> u8 {
        let v = (1.5 - (4.0 * x - center).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Class id → display intensity. Wraps like an 8-bit multiply.
pub fn scaled(label: u8) -> u8 {
    label.wrapping_mul(LABEL_SCALE)
}

pub fn colorize(map: &LabelMap) -> RgbImage {
    RgbImage::from_fn(map.width as u32, map.height as u32, |x, y| {
        jet(scaled(map.get(x as usize, y as usize).unwrap_or(0)))
    })
}

/// Grey image of `label × 80`, used for training summaries.
pub fn to_gray(map: &LabelMap) -> GrayImage {
    GrayImage::from_fn(map.width as u32, map.height as u32, |x, y| {
        Luma([scaled(map.get(x as usize, y as usize).unwrap_or(0))])
    })
}

/// Three-panel validation image: blended prediction, ground truth, prediction.
pub fn compose_overlay(image: &RgbImage, gt: &LabelMap, pred: &LabelMap) -> Result<RgbImage> {
    let (w, h) = image.dimensions();
    for (name, map) in [("ground truth", gt), ("prediction", pred)] {
        if map.width != w as usize || map.height != h as usize {
            bail!(
                "{} is {}x{} but image is {}x{}",
                name,
                map.width,
                map.height,
                w,
                h
            );
        }
    }

    let gt_color   = colorize(gt);
    let pred_color = colorize(pred);

    let mut out = RgbImage::new(3 * w, h);
    for y in 0..h {
        for x in 0..w {
            let src = image.get_pixel(x, y);
            let p   = pred_color.get_pixel(x, y);
            let blended = Rgb([0, 1, 2].map(|c| {
                (IMAGE_WEIGHT * src[c] as f32 + PRED_WEIGHT * p[c] as f32) as u8
            }));
            out.put_pixel(x, y, blended);
            out.put_pixel(w + x, y, *gt_color.get_pixel(x, y));
            out.put_pixel(2 * w + x, y, *p);
        }
    }
    Ok(out)
}

/// `<mode><index>.png` with the index zero-padded to the digit
/// count of `total`, so files sort in sample order.
pub fn eval_file_name(mode: &str, index: usize, total: usize) -> String {
    let digits = total.max(1).ilog10() as usize + 1;
    format!("{mode}{index:0digits$}.png")
}

pub fn save_png(image: &RgbImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("Cannot write image '{}'", path.display()))
}

pub fn save_gray_png(image: &GrayImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("Cannot write image '{}'", path.display()))
}
