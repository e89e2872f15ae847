//! Depth-sensor detector: captures colour+depth pairs, runs ad-hoc detection
//! on the colour frame and visualizes the depth grid alongside it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;

use crate::depth;
use crate::detect::bitmap::BitmapDetector;
use crate::detect::detector::{
    Detector, DetectorKind, DetectorState, Emitter, Lifecycle, ResultSink, RunExit,
};
use crate::detect::engine::{EngineOptions, PoseEngine};
use crate::detect::result::SensorImages;
use crate::ingest::DepthSensor;

pub struct SensorDetector {
    detector: BitmapDetector,
    sensor: Mutex<Box<dyn DepthSensor>>,
    device_index: u32,
    exit_requested: AtomicBool,
    lifecycle: Lifecycle,
}

impl SensorDetector {
    pub fn new(
        engine: Arc<dyn PoseEngine>,
        options: EngineOptions,
        sensor: Box<dyn DepthSensor>,
        device_index: u32,
    ) -> Result<Self> {
        let lifecycle = Lifecycle::new();
        let detector = BitmapDetector::new(engine, options)?;
        lifecycle.configured();
        Ok(Self {
            detector,
            sensor: Mutex::new(sensor),
            device_index,
            exit_requested: AtomicBool::new(false),
            lifecycle,
        })
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::SeqCst)
    }

    fn sensor(&self) -> MutexGuard<'_, Box<dyn DepthSensor>> {
        match self.sensor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn capture_loop(&self, sensor: &mut dyn DepthSensor, emitter: &mut Emitter<'_>) -> RunExit {
        loop {
            if self.exit_requested() {
                return RunExit::Stopped;
            }
            let capture = match sensor.capture() {
                Ok(capture) => capture,
                Err(err) => {
                    log::warn!("{}: capture failed: {:#}", sensor.name(), err);
                    return RunExit::Exhausted;
                }
            };
            let depth = depth::visualize(&capture.depth);
            let payload = self.detector.detect(&capture.color);
            emitter.emit_sensor(
                payload,
                SensorImages {
                    color: capture.color,
                    depth,
                },
            );
        }
    }
}

impl Detector for SensorDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Sensor
    }

    fn state(&self) -> DetectorState {
        self.lifecycle.current()
    }

    fn run(&self, sink: &mut dyn ResultSink) -> Result<()> {
        self.lifecycle.begin_run()?;

        let mut emitter = Emitter::new(sink);
        let mut sensor = self.sensor();
        let exit = match sensor.open(self.device_index) {
            Ok(()) => {
                log::info!("{}: capturing from device {}", sensor.name(), self.device_index);
                let exit = self.capture_loop(&mut **sensor, &mut emitter);
                if let Err(err) = sensor.close() {
                    log::warn!("{}: close failed: {:#}", sensor.name(), err);
                }
                exit
            }
            Err(err) => {
                log::warn!(
                    "{}: device {} could not be opened: {:#}",
                    sensor.name(),
                    self.device_index,
                    err
                );
                RunExit::Exhausted
            }
        };
        drop(sensor);

        emitter.finish();
        self.detector.dispose();
        self.lifecycle.finish(exit);
        Ok(())
    }

    fn stop(&self) {
        self.exit_requested.store(true, Ordering::SeqCst);
        self.lifecycle.request_stop();
    }

    fn dispose_data(&self) {
        self.detector.dispose_data();
    }
}
