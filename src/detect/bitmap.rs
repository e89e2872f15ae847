//! Ad-hoc detection on caller-supplied bitmaps.
//!
//! Unlike the other detectors this one has no run loop: the caller pushes
//! frames one at a time, and the engine stays alive until `dispose`.

use std::sync::Arc;

use anyhow::Result;

use crate::detect::buffer::{BufferRead, BufferSlot};
use crate::detect::detector::OwnedEngine;
use crate::detect::engine::{EngineOptions, PoseEngine};
use crate::detect::result::PoseData;
use crate::frame::RgbFrame;

pub struct BitmapDetector {
    engine: OwnedEngine,
    buffers: BufferSlot,
}

impl BitmapDetector {
    pub fn new(engine: Arc<dyn PoseEngine>, options: EngineOptions) -> Result<Self> {
        Ok(Self {
            engine: OwnedEngine::start(engine, &options.without_producer())?,
            buffers: BufferSlot::default(),
        })
    }

    /// Detect on one frame. `None` when the engine fails or yields no datum;
    /// failures are logged, never raised.
    pub fn detect(&self, frame: &RgbFrame) -> Option<PoseData> {
        let buffer = match self.engine.process_frame(frame) {
            Ok(buffer) => buffer,
            Err(err) => {
                log::warn!("bitmap detection failed: {:#}", err);
                return None;
            }
        };
        let payload = match buffer.try_get() {
            BufferRead::Data(data) => data.into_iter().next(),
            BufferRead::Empty => None,
            BufferRead::Unavailable => {
                log::warn!("engine result could not be read");
                None
            }
        };
        self.buffers.replace(buffer);
        payload
    }

    /// Detect on a row-padded RGB bitmap.
    pub fn detect_strided(
        &self,
        bytes: &[u8],
        width: u32,
        height: u32,
        stride: usize,
    ) -> Option<PoseData> {
        match RgbFrame::from_strided(bytes, width, height, stride) {
            Ok(frame) => self.detect(&frame),
            Err(err) => {
                log::warn!("bitmap rejected: {:#}", err);
                None
            }
        }
    }

    /// Release the buffer behind the last detection.
    pub fn dispose_data(&self) {
        self.buffers.release();
    }

    /// Release the last buffer and the engine. Safe to call more than once.
    pub fn dispose(&self) {
        self.buffers.release();
        if self.engine.dispose() {
            log::debug!("bitmap detector disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.engine.is_disposed()
    }
}

impl Drop for BitmapDetector {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubEngine;

    fn frame() -> RgbFrame {
        RgbFrame::new(vec![7u8; 4 * 2 * 3], 4, 2).unwrap()
    }

    #[test]
    fn detects_until_disposed() {
        let engine = StubEngine::new();
        let probe = engine.probe();
        let detector = BitmapDetector::new(Arc::new(engine), EngineOptions::default()).unwrap();

        let first = detector.detect(&frame()).expect("payload");
        let second = detector.detect(&frame()).expect("payload");
        assert_eq!(first.pose, second.pose);
        assert_eq!(probe.buffers_released(), 1);

        detector.dispose();
        detector.dispose();
        assert!(detector.is_disposed());
        assert_eq!(probe.disposed(), 1);
        assert_eq!(probe.buffers_released(), probe.buffers_issued());
        assert!(detector.detect(&frame()).is_none());
    }

    #[test]
    fn strided_rows_are_packed() {
        let detector =
            BitmapDetector::new(Arc::new(StubEngine::new()), EngineOptions::default()).unwrap();
        // 2x2 image, 8-byte rows (6 bytes of pixels + 2 padding).
        let mut bytes = vec![0u8; 16];
        bytes[..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        bytes[8..14].copy_from_slice(&[7, 8, 9, 10, 11, 12]);
        let data = detector.detect_strided(&bytes, 2, 2, 8).expect("payload");
        let rendered = data.rendered_frame().expect("rendered");
        assert_eq!(rendered.pixels(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);

        assert!(detector.detect_strided(&bytes, 2, 2, 4).is_none());
    }

    #[test]
    fn drop_disposes_engine() {
        let engine = StubEngine::new();
        let probe = engine.probe();
        let detector = BitmapDetector::new(Arc::new(engine), EngineOptions::default()).unwrap();
        drop(detector);
        assert_eq!(probe.disposed(), 1);
    }
}
