//! Local file inputs.
//!
//! Single images are decoded here and pushed to the engine one frame at a time.
//! Videos and image directories are only validated here; the engine reads them.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::InputSource;
use crate::frame::RgbFrame;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi"];

/// Decode a single image from disk.
pub fn open_image(path: &Path) -> Result<RgbFrame> {
    let frame = RgbFrame::open(path)?;
    log::debug!(
        "opened {} ({}x{})",
        path.display(),
        frame.width(),
        frame.height()
    );
    Ok(frame)
}

/// Check that a file-backed input points at something the engine can read.
pub fn validate_input(source: &InputSource) -> Result<()> {
    match source {
        InputSource::Image(path) => {
            require_extension(path, IMAGE_EXTENSIONS)?;
            require_file(path)
        }
        InputSource::Video(path) => {
            require_extension(path, VIDEO_EXTENSIONS)?;
            require_file(path)
        }
        InputSource::ImageDir(path) => {
            if !path.is_dir() {
                return Err(anyhow!("image directory {} does not exist", path.display()));
            }
            Ok(())
        }
        InputSource::Camera(index) => {
            if *index < 0 {
                return Err(anyhow!("camera index must be >= 0, got {}", index));
            }
            Ok(())
        }
        InputSource::DepthSensor(_) => Ok(()),
    }
}

/// Image files in `dir`, in lexical order.
pub fn list_image_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read image directory {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, IMAGE_EXTENSIONS) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn require_extension(path: &Path, allowed: &[&str]) -> Result<()> {
    if has_extension(path, allowed) {
        Ok(())
    } else {
        Err(anyhow!(
            "{} is not a supported file (expected one of: {})",
            path.display(),
            allowed.join(", ")
        ))
    }
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(anyhow!("input file {} does not exist", path.display()))
    }
}
