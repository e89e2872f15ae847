use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};

use crate::detect::buffer::NativeBuffer;
use crate::frame::RgbFrame;

pub const DEFAULT_NET_RESOLUTION: Resolution = Resolution {
    width: -1,
    height: 368,
};
pub const DEFAULT_MODEL_POSE: &str = "BODY_25";
pub const DEFAULT_LOGGING_LEVEL: u8 = 3;

const IMAGE_OUTPUT_DIR: &str = "images";
const JSON_OUTPUT_DIR: &str = "json";

/// Network input size. Either side may be `-1`, letting the engine derive it
/// from the other side and the frame aspect ratio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: i32,
    pub height: i32,
}

impl Resolution {
    pub fn parse(value: &str) -> Result<Self> {
        static RESOLUTION_RE: OnceLock<regex::Regex> = OnceLock::new();
        let re = RESOLUTION_RE
            .get_or_init(|| regex::Regex::new(r"^(-1|[1-9][0-9]{0,4})x(-1|[1-9][0-9]{0,4})$").unwrap());
        let caps = re
            .captures(value.trim())
            .ok_or_else(|| anyhow!("invalid resolution '{}' (expected WxH, -1 for auto)", value))?;
        Ok(Self {
            width: caps[1].parse()?,
            height: caps[2].parse()?,
        })
    }
}

impl FromStr for Resolution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Where the engine pulls frames from when it drives its own input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Producer {
    Video(PathBuf),
    ImageDir(PathBuf),
    Camera(i32),
}

/// Artifact directories the engine writes into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    pub images: PathBuf,
    pub json: PathBuf,
}

impl OutputPaths {
    pub fn under(dir: &Path) -> Self {
        Self {
            images: dir.join(IMAGE_OUTPUT_DIR),
            json: dir.join(JSON_OUTPUT_DIR),
        }
    }
}

/// Options handed to `PoseEngine::configure`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    pub net_resolution: Resolution,
    /// `None` disables the face sub-detector.
    pub face_resolution: Option<Resolution>,
    /// `None` disables the hand sub-detector.
    pub hand_resolution: Option<Resolution>,
    pub model_pose: String,
    /// `None` disables on-disk artifacts.
    pub output: Option<OutputPaths>,
    /// Engine-side log priority threshold.
    pub logging_level: u8,
    /// `None` when frames are pushed per call instead of pulled by the engine.
    pub producer: Option<Producer>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            net_resolution: DEFAULT_NET_RESOLUTION,
            face_resolution: None,
            hand_resolution: None,
            model_pose: DEFAULT_MODEL_POSE.to_string(),
            output: None,
            logging_level: DEFAULT_LOGGING_LEVEL,
            producer: None,
        }
    }
}

impl EngineOptions {
    pub fn face_enabled(&self) -> bool {
        self.face_resolution.is_some()
    }

    pub fn hand_enabled(&self) -> bool {
        self.hand_resolution.is_some()
    }

    pub fn with_producer(mut self, producer: Producer) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn without_producer(mut self) -> Self {
        self.producer = None;
        self
    }

    /// Reject option sets no engine can be configured with.
    pub fn validate(&self) -> Result<()> {
        if self.model_pose.trim().is_empty() {
            return Err(anyhow!("pose model must not be empty"));
        }
        if self.net_resolution.width == -1 && self.net_resolution.height == -1 {
            return Err(anyhow!("net resolution needs at least one fixed side"));
        }
        Ok(())
    }
}

/// External pose-estimation engine.
///
/// The core calls `configure` once, `start` once, then either `process_frame`
/// (frames pushed by the caller) or `wait_and_pop` (frames pulled from the
/// configured producer), and `dispose` exactly once at teardown.
///
/// `dispose` may be called from another thread while a `process_frame` or
/// `wait_and_pop` call is in flight. Implementations must make that call
/// return promptly (an error for `process_frame`, `Ok(None)` or an error for
/// `wait_and_pop`) instead of hanging on the released resources.
pub trait PoseEngine: Send + Sync {
    /// Engine identifier.
    fn name(&self) -> &'static str;

    fn configure(&self, options: &EngineOptions) -> Result<()>;

    fn start(&self) -> Result<()>;

    /// Run detection on one caller-supplied frame.
    ///
    /// An error means the engine could not produce a result for this frame.
    fn process_frame(&self, frame: &RgbFrame) -> Result<NativeBuffer>;

    /// Block until the next frame from the producer has been processed.
    ///
    /// `Ok(None)` means the producer is exhausted.
    fn wait_and_pop(&self) -> Result<Option<NativeBuffer>>;

    fn dispose(&self);
}
