use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{
    EngineOptions, OutputPaths, Resolution, DEFAULT_LOGGING_LEVEL, DEFAULT_MODEL_POSE,
    DEFAULT_NET_RESOLUTION,
};
use crate::ingest::InputSource;

const DEFAULT_ENGINE: &str = "stub";
const CONFIG_ENV: &str = "POSE_STREAM_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    engine: Option<String>,
    input: Option<InputConfigFile>,
    pose: Option<PoseConfigFile>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct InputConfigFile {
    kind: String,
    path: Option<PathBuf>,
    index: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
struct PoseConfigFile {
    net_resolution: Option<String>,
    face_resolution: Option<String>,
    hand_resolution: Option<String>,
    model: Option<String>,
    logging_level: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Registry name of the pose engine.
    pub engine: String,
    pub input: Option<InputSource>,
    pub net_resolution: Resolution,
    pub face_resolution: Option<Resolution>,
    pub hand_resolution: Option<Resolution>,
    pub model_pose: String,
    pub output_dir: Option<PathBuf>,
    pub logging_level: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_string(),
            input: None,
            net_resolution: DEFAULT_NET_RESOLUTION,
            face_resolution: None,
            hand_resolution: None,
            model_pose: DEFAULT_MODEL_POSE.to_string(),
            output_dir: None,
            logging_level: DEFAULT_LOGGING_LEVEL,
        }
    }
}

impl PipelineConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Result<Self> {
        let engine = file.engine.unwrap_or_else(|| DEFAULT_ENGINE.to_string());
        let input = match file.input {
            Some(input) => Some(InputSource::from_kind(&input.kind, input.path, input.index)?),
            None => None,
        };
        let pose = file.pose.unwrap_or_default();
        let net_resolution = match pose.net_resolution.as_deref() {
            Some(value) => Resolution::parse(value)?,
            None => DEFAULT_NET_RESOLUTION,
        };
        let face_resolution = optional_resolution(pose.face_resolution.as_deref())?;
        let hand_resolution = optional_resolution(pose.hand_resolution.as_deref())?;
        let model_pose = pose
            .model
            .unwrap_or_else(|| DEFAULT_MODEL_POSE.to_string());
        let logging_level = match pose.logging_level {
            Some(level) => parse_logging_level(level)?,
            None => DEFAULT_LOGGING_LEVEL,
        };
        let output_dir = file.output_dir.filter(|dir| !dir.as_os_str().is_empty());
        Ok(Self {
            engine,
            input,
            net_resolution,
            face_resolution,
            hand_resolution,
            model_pose,
            output_dir,
            logging_level,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(engine) = std::env::var("POSE_STREAM_ENGINE") {
            if !engine.trim().is_empty() {
                self.engine = engine.trim().to_string();
            }
        }
        if let Ok(value) = std::env::var("POSE_STREAM_NET_RESOLUTION") {
            if !value.trim().is_empty() {
                self.net_resolution = Resolution::parse(&value)?;
            }
        }
        if let Ok(value) = std::env::var("POSE_STREAM_FACE_RESOLUTION") {
            self.face_resolution = optional_resolution(Some(&value))?;
        }
        if let Ok(value) = std::env::var("POSE_STREAM_HAND_RESOLUTION") {
            self.hand_resolution = optional_resolution(Some(&value))?;
        }
        if let Ok(model) = std::env::var("POSE_STREAM_MODEL_POSE") {
            if !model.trim().is_empty() {
                self.model_pose = model.trim().to_string();
            }
        }
        if let Ok(dir) = std::env::var("POSE_STREAM_OUTPUT_DIR") {
            self.output_dir = if dir.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }
        if let Ok(level) = std::env::var("POSE_STREAM_LOGGING_LEVEL") {
            let level: i64 = level
                .trim()
                .parse()
                .map_err(|_| anyhow!("POSE_STREAM_LOGGING_LEVEL must be an integer"))?;
            self.logging_level = parse_logging_level(level)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.trim().is_empty() {
            return Err(anyhow!("engine name must not be empty"));
        }
        self.engine_options().validate()
    }

    /// Fresh engine options for one detector. The input producer is left
    /// unset; streaming detectors add their own.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            net_resolution: self.net_resolution,
            face_resolution: self.face_resolution,
            hand_resolution: self.hand_resolution,
            model_pose: self.model_pose.clone(),
            output: self.output_dir.as_deref().map(OutputPaths::under),
            logging_level: self.logging_level,
            producer: None,
        }
    }
}

/// Empty string disables the sub-detector.
fn optional_resolution(value: Option<&str>) -> Result<Option<Resolution>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => Resolution::parse(value).map(Some),
    }
}

fn parse_logging_level(level: i64) -> Result<u8> {
    u8::try_from(level).map_err(|_| anyhow!("logging level must be in 0..=255, got {}", level))
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() -> Result<()> {
        let cfg = PipelineConfig::from_file(PipelineConfigFile::default())?;
        assert_eq!(cfg.engine, "stub");
        assert_eq!(cfg.net_resolution, DEFAULT_NET_RESOLUTION);
        assert_eq!(cfg.model_pose, "BODY_25");
        assert_eq!(cfg.logging_level, 3);
        assert!(cfg.input.is_none());
        assert!(cfg.engine_options().output.is_none());
        Ok(())
    }

    #[test]
    fn empty_resolution_disables_sub_detector() -> Result<()> {
        assert_eq!(optional_resolution(Some("  "))?, None);
        assert_eq!(optional_resolution(None)?, None);
        assert!(optional_resolution(Some("368x368"))?.is_some());
        assert!(optional_resolution(Some("big")).is_err());
        Ok(())
    }

    #[test]
    fn logging_level_is_bounded() {
        assert_eq!(parse_logging_level(0).ok(), Some(0));
        assert_eq!(parse_logging_level(255).ok(), Some(255));
        assert!(parse_logging_level(256).is_err());
        assert!(parse_logging_level(-1).is_err());
    }

    #[test]
    fn output_dir_expands_to_artifact_paths() {
        let cfg = PipelineConfig {
            output_dir: Some(PathBuf::from("/data/out")),
            ..PipelineConfig::default()
        };
        let output = cfg.engine_options().output.expect("output paths");
        assert_eq!(output.images, PathBuf::from("/data/out/images"));
        assert_eq!(output.json, PathBuf::from("/data/out/json"));
    }
}
