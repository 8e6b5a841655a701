// ============================================================
// Layer 4 — Segmentation Folder Loader
// ============================================================
// Loads one split of a dataset laid out as:
//
//   <data_dir>/<data_name>/<split>/images/<stem>.png|jpg|jpeg
//   <data_dir>/<data_name>/<split>/labels/<stem>.png
//
// Label files hold one class id per pixel. Single-channel PNGs
// are read as-is; for colour PNGs the first channel is taken as
// the class id (common when labels were exported as RGB).
//
// Samples are sorted by stem so every run sees the same order,
// which keeps the numbering of validation overlays stable.

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::label_map::LabelMap;
use crate::domain::sample::SegSample;
use crate::domain::traits::SampleSource;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Loads every labelled image of one dataset split.
/// Implements the SampleSource trait from Layer 3.
pub struct SegFolderLoader {
    split_dir: PathBuf,
}

impl SegFolderLoader {
    pub fn new(data_dir: impl AsRef<Path>, data_name: &str, split: &str) -> Self {
        Self {
            split_dir: data_dir.as_ref().join(data_name).join(split),
        }
    }

    pub fn split_dir(&self) -> &Path {
        &self.split_dir
    }

    /// Image files in `images/`, sorted by file name.
    fn image_paths(&self) -> Result<Vec<PathBuf>> {
        let images_dir = self.split_dir.join("images");
        let mut paths = Vec::new();
        for entry in fs::read_dir(&images_dir)
            .with_context(|| format!("Cannot read directory '{}'", images_dir.display()))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl SampleSource for SegFolderLoader {
    fn load_all(&self) -> Result<Vec<SegSample>> {
        if !self.split_dir.is_dir() {
            bail!("Dataset split '{}' does not exist", self.split_dir.display());
        }

        let labels_dir = self.split_dir.join("labels");
        let mut samples = Vec::new();

        for image_path in self.image_paths()? {
            let stem = match image_path.file_stem().and_then(|s| s.to_str()) {
                Some(s) => s.to_string(),
                None => continue,
            };

            let label_path = labels_dir.join(format!("{stem}.png"));
            if !label_path.exists() {
                tracing::warn!(
                    "Skipping '{}': no label file '{}'",
                    image_path.display(),
                    label_path.display()
                );
                continue;
            }

            let sample = load_pair(&stem, &image_path, &label_path)?;
            tracing::debug!("Loaded: {} ({}x{})", stem, sample.width(), sample.height());
            samples.push(sample);
        }

        tracing::info!(
            "Loaded {} samples from '{}'",
            samples.len(),
            self.split_dir.display()
        );
        Ok(samples)
    }
}

/// Decode one image/label pair into a SegSample.
fn load_pair(stem: &str, image_path: &Path, label_path: &Path) -> Result<SegSample> {
    let image = image::open(image_path)
        .with_context(|| format!("Cannot decode image '{}'", image_path.display()))?
        .to_rgb8();
    let label = image::open(label_path)
        .with_context(|| format!("Cannot decode label '{}'", label_path.display()))?;
    let label = decode_label(label);
    SegSample::new(stem, image, label)
}

/// Turn a decoded label image into a LabelMap of class ids.
pub fn decode_label(img: DynamicImage) -> LabelMap {
    let (width, height) = (img.width() as usize, img.height() as usize);
    let labels = match img {
        DynamicImage::ImageLuma8(gray) => gray.into_raw(),
        other => other.into_rgb8().pixels().map(|p| p[0]).collect(),
    };
    LabelMap { width, height, labels }
}
