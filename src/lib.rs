//! Pose Stream
//!
//! Streaming body-pose detection on top of an external pose-estimation engine.
//!
//! # Architecture
//!
//! A detector turns one input modality into an ordered stream of detection
//! results, always terminated by exactly one final sentinel:
//!
//! 1. **Single-shot**: one image file, one result.
//! 2. **Streaming**: the engine pulls frames from a video, an image directory or a camera.
//! 3. **Ad-hoc**: caller-supplied bitmaps, one call per frame.
//! 4. **Depth sensor**: colour+depth captures, detected ad hoc, depth visualized.
//!
//! Engine results live in engine memory. Every payload handed to a consumer
//! is a copy, and the engine buffer behind it is released exactly once.
//!
//! # Module Structure
//!
//! - `detect`: detector contract, variants, engine contract, result buffers
//! - `ingest`: input modalities, file validation, depth sensors
//! - `frame`: owned RGB and depth frames
//! - `depth`: depth-to-colour visualization
//! - `pipeline`: background run + sequential consumer delivery
//! - `config`: file + environment configuration

pub mod config;
pub mod depth;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;

pub use config::PipelineConfig;
pub use detect::{
    build_detector, BitmapDetector, DetectionResult, Detector, DetectorKind, DetectorState,
    EngineOptions, EngineRegistry, ImageDetector, PoseData, PoseEngine, PoseKeypoints,
    SensorDetector, SequenceDetector,
};
pub use frame::{DepthFrame, RgbFrame};
pub use ingest::InputSource;
pub use pipeline::{Pipeline, PipelineHandle};
