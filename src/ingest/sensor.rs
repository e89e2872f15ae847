//! Depth-sensing camera source.
//!
//! A `DepthSensor` is opened once, yields one colour+depth pair per `capture`,
//! and is closed when the detection loop ends. `capture` may block until the
//! hardware signals that a frame is ready.

use anyhow::{anyhow, Result};

use crate::frame::{DepthFrame, RgbFrame};

/// One synchronized capture.
#[derive(Clone, Debug)]
pub struct SensorCapture {
    pub color: RgbFrame,
    pub depth: DepthFrame,
}

pub trait DepthSensor: Send {
    /// Sensor identifier.
    fn name(&self) -> &'static str;

    fn open(&mut self, device_index: u32) -> Result<()>;

    /// Block until the next synchronized colour+depth pair is available.
    fn capture(&mut self) -> Result<SensorCapture>;

    fn close(&mut self) -> Result<()>;
}

/// Configuration for the synthetic sensor.
#[derive(Clone, Debug)]
pub struct SyntheticSensorConfig {
    pub color_width: u32,
    pub color_height: u32,
    pub depth_width: u32,
    pub depth_height: u32,
    /// Captures before the sensor reports end of stream. `None` runs forever.
    pub frame_limit: Option<u64>,
}

impl Default for SyntheticSensorConfig {
    fn default() -> Self {
        // 720p colour, 2x2-binned narrow field-of-view depth.
        Self {
            color_width: 1280,
            color_height: 720,
            depth_width: 320,
            depth_height: 288,
            frame_limit: None,
        }
    }
}

/// In-process sensor producing deterministic frames.
///
/// The depth grid is a ramp across the visualizer's range with an invalid
/// (zero) left column and a saturated bottom-right corner.
pub struct SyntheticSensor {
    config: SyntheticSensorConfig,
    device_index: Option<u32>,
    frame_count: u64,
}

impl SyntheticSensor {
    pub fn new(config: SyntheticSensorConfig) -> Self {
        Self {
            config,
            device_index: None,
            frame_count: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.device_index.is_some()
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn color_pixels(&self) -> Vec<u8> {
        let len = (self.config.color_width * self.config.color_height * 3) as usize;
        (0..len)
            .map(|i| ((i as u64 + self.frame_count) % 256) as u8)
            .collect()
    }

    fn depth_samples(&self) -> Vec<u16> {
        let width = self.config.depth_width;
        let height = self.config.depth_height;
        let mut samples = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let sample = if x == 0 {
                    0
                } else if x + 1 == width && y + 1 == height {
                    u16::MAX
                } else {
                    let span = width.max(2) as u64 - 1;
                    (x as u64 * 3000 / span + self.frame_count % 10) as u16
                };
                samples.push(sample);
            }
        }
        samples
    }
}

impl Default for SyntheticSensor {
    fn default() -> Self {
        Self::new(SyntheticSensorConfig::default())
    }
}

impl DepthSensor for SyntheticSensor {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&mut self, device_index: u32) -> Result<()> {
        if let Some(open) = self.device_index {
            return Err(anyhow!("sensor already open on device {}", open));
        }
        self.device_index = Some(device_index);
        log::info!("SyntheticSensor: opened device {}", device_index);
        Ok(())
    }

    fn capture(&mut self) -> Result<SensorCapture> {
        if self.device_index.is_none() {
            return Err(anyhow!("sensor is not open"));
        }
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Err(anyhow!("sensor stream ended after {} captures", limit));
            }
        }

        let color = RgbFrame::new(
            self.color_pixels(),
            self.config.color_width,
            self.config.color_height,
        )?;
        let depth = DepthFrame::new(
            self.depth_samples(),
            self.config.depth_width,
            self.config.depth_height,
        )?;
        self.frame_count += 1;
        Ok(SensorCapture { color, depth })
    }

    fn close(&mut self) -> Result<()> {
        if let Some(index) = self.device_index.take() {
            log::info!(
                "SyntheticSensor: closed device {} after {} captures",
                index,
                self.frame_count
            );
        }
        Ok(())
    }
}
