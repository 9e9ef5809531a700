//! Disk layout for flagged frames.
//!
//! The monitor writes candidate images (plus a small sidecar describing the
//! posture checks) into a flat directory. The verifier later sorts each image
//! into one of the `conf_1`..`conf_5` folders the gallery serves.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;

use crate::config::ArchiveConfig;
use crate::posture::PostureValidation;

/// Extensions treated as images when scanning directories.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff"];

/// Confidence buckets run from "no potential" to "clear violation".
pub const MIN_CONFIDENCE: u8 = 1;
pub const MAX_CONFIDENCE: u8 = 5;

/// Writes flagged frames and their posture summaries.
pub struct CandidateStore {
    dir: PathBuf,
    prefix: String,
    write_sidecar: bool,
}

impl CandidateStore {
    pub fn from_config(config: &ArchiveConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.dir);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create archive dir {}", dir.display()))?;
        Ok(Self {
            dir,
            prefix: config.prefix.clone(),
            write_sidecar: config.write_sidecar,
        })
    }

    /// Saves the annotated frame and returns the image path.
    pub fn save(
        &self,
        frame: &Mat,
        frame_idx: u64,
        person_idx: usize,
        validation: &PostureValidation,
    ) -> Result<PathBuf> {
        let now = Local::now();
        let stem = format!(
            "{}_{}_frame{:06}_person{}",
            self.prefix,
            now.format("%Y%m%d_%H%M%S"),
            frame_idx,
            person_idx
        );

        let image_path = self.dir.join(format!("{stem}.jpg"));
        let path_str = image_path
            .to_str()
            .context("archive path is not valid UTF-8")?;
        let written = imgcodecs::imwrite(path_str, frame, &Vector::new())
            .with_context(|| format!("failed to encode {}", image_path.display()))?;
        if !written {
            bail!("imwrite refused to write {}", image_path.display());
        }

        if self.write_sidecar {
            let sidecar = self.dir.join(format!("{stem}_results.txt"));
            let body = format!(
                "Zipping pose candidate\n\
                 Timestamp: {}\n\
                 Frame: {}\n\
                 Person: {}\n\
                 Shoulders: {}\n\
                 Left Wrist: {}\n\
                 Right Wrist: {}\n",
                now.format("%Y-%m-%d %H:%M:%S"),
                frame_idx,
                person_idx,
                validation.shoulders.message,
                validation.left.message,
                validation.right.message,
            );
            fs::write(&sidecar, body)
                .with_context(|| format!("failed to write {}", sidecar.display()))?;
        }

        Ok(image_path)
    }
}

/// Folder name for a confidence bucket, e.g. `conf_3`.
pub fn conf_folder_name(level: u8) -> String {
    format!("conf_{level}")
}

/// True for the five bucket names the gallery is allowed to serve.
pub fn is_conf_folder(name: &str) -> bool {
    (MIN_CONFIDENCE..=MAX_CONFIDENCE).any(|level| name == conf_folder_name(level))
}

/// Creates `conf_1`..`conf_5` under `root`.
pub fn ensure_conf_dirs(root: &Path) -> Result<()> {
    for level in MIN_CONFIDENCE..=MAX_CONFIDENCE {
        let dir = root.join(conf_folder_name(level));
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.iter().any(|known| *known == ext)
        })
        .unwrap_or(false)
}

/// Images directly inside `dir`, sorted by name. Missing dir yields an error.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Moves a verified image into its confidence bucket and returns the new path.
pub fn move_to_conf(image: &Path, sorted_root: &Path, level: u8) -> Result<PathBuf> {
    let name = image
        .file_name()
        .with_context(|| format!("{} has no file name", image.display()))?;
    let target = sorted_root.join(conf_folder_name(level)).join(name);

    // rename fails across filesystems, fall back to copy + remove.
    if fs::rename(image, &target).is_err() {
        fs::copy(image, &target)
            .with_context(|| format!("failed to copy {} to {}", image.display(), target.display()))?;
        fs::remove_file(image)
            .with_context(|| format!("failed to remove {}", image.display()))?;
    }

    Ok(target)
}
