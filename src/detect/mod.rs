mod bitmap;
mod buffer;
mod detector;
mod engine;
mod image;
mod registry;
mod result;
mod sensor;
mod sequence;

pub mod backends;

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::config::PipelineConfig;
use crate::ingest::{validate_input, InputSource};

pub use bitmap::BitmapDetector;
pub use buffer::{BufferRead, NativeBuffer, NativeContainer};
pub use detector::{Detector, DetectorKind, DetectorState, OwnedEngine, ResultSink};
pub use engine::{
    EngineOptions, OutputPaths, PoseEngine, Producer, Resolution, DEFAULT_LOGGING_LEVEL,
    DEFAULT_MODEL_POSE, DEFAULT_NET_RESOLUTION,
};
pub use image::ImageDetector;
pub use registry::{EngineFactory, EngineRegistry, SensorFactory};
pub use result::{DetectionResult, Keypoint, KeypointRow, PoseData, PoseKeypoints, SensorImages};
pub use sensor::SensorDetector;
pub use sequence::SequenceDetector;

/// Build the detector variant for the configured input.
///
/// Each call creates a fresh engine instance from `registry` and configures it
/// from scratch; nothing is shared with previously built detectors.
pub fn build_detector(
    config: &PipelineConfig,
    registry: &EngineRegistry,
) -> Result<Arc<dyn Detector>> {
    let input = config
        .input
        .as_ref()
        .ok_or_else(|| anyhow!("no input source configured"))?;
    validate_input(input)?;

    let engine = registry.create(&config.engine)?;
    let options = config.engine_options();
    let detector: Arc<dyn Detector> = match (input, input.producer()) {
        (_, Some(producer)) => Arc::new(SequenceDetector::new(engine, options, producer)?),
        (InputSource::Image(path), None) => {
            Arc::new(ImageDetector::new(engine, options, path.clone())?)
        }
        (InputSource::DepthSensor(index), None) => {
            let sensor = registry.create_sensor()?;
            Arc::new(SensorDetector::new(engine, options, sensor, *index)?)
        }
        (other, None) => return Err(anyhow!("no detector reads input {:?}", other)),
    };
    log::info!(
        "{:?} detector ready for {:?} (engine {})",
        detector.kind(),
        input,
        config.engine
    );
    Ok(detector)
}
