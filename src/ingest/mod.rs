//! Frame and device sources.
//!
//! This module provides the inputs a detector can be pointed at:
//! - Single image files (decoded in-process)
//! - Video files, image directories and cameras (read by the engine itself)
//! - Depth-sensing cameras (synchronized colour+depth pairs)
//!
//! `InputSource` is the closed set of modalities; `detect::build_detector`
//! dispatches on it.

pub mod file;
pub mod sensor;

use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::detect::Producer;

pub use file::{list_image_dir, open_image, validate_input};
pub use sensor::{DepthSensor, SensorCapture, SyntheticSensor, SyntheticSensorConfig};

/// Input modality selected by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSource {
    Image(PathBuf),
    Video(PathBuf),
    ImageDir(PathBuf),
    Camera(i32),
    DepthSensor(u32),
}

impl InputSource {
    /// Build a source from its config-file spelling.
    pub fn from_kind(kind: &str, path: Option<PathBuf>, index: Option<i64>) -> Result<Self> {
        let need_path = |path: Option<PathBuf>| {
            path.filter(|p| !p.as_os_str().is_empty())
                .ok_or_else(|| anyhow!("input kind '{}' requires a path", kind))
        };
        match kind.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(Self::Image(need_path(path)?)),
            "video" => Ok(Self::Video(need_path(path)?)),
            "image_dir" | "image-dir" => Ok(Self::ImageDir(need_path(path)?)),
            "camera" | "webcam" => {
                let index = index.unwrap_or(0);
                let index = i32::try_from(index)
                    .map_err(|_| anyhow!("camera index {} out of range", index))?;
                Ok(Self::Camera(index))
            }
            "depth_sensor" | "depth-sensor" | "kinect" => {
                let index = index.unwrap_or(0);
                let index = u32::try_from(index)
                    .map_err(|_| anyhow!("depth sensor index {} out of range", index))?;
                Ok(Self::DepthSensor(index))
            }
            other => Err(anyhow!("unknown input kind '{}'", other)),
        }
    }

    /// Engine-side producer for modalities the engine reads on its own.
    pub fn producer(&self) -> Option<Producer> {
        match self {
            Self::Video(path) => Some(Producer::Video(path.clone())),
            Self::ImageDir(path) => Some(Producer::ImageDir(path.clone())),
            Self::Camera(index) => Some(Producer::Camera(*index)),
            Self::Image(_) | Self::DepthSensor(_) => None,
        }
    }
}
