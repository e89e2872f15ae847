//! Single-shot detector: one image file, one result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::detect::buffer::{BufferRead, BufferSlot};
use crate::detect::detector::{
    Detector, DetectorKind, DetectorState, Emitter, Lifecycle, OwnedEngine, ResultSink, RunExit,
};
use crate::detect::engine::{EngineOptions, PoseEngine};
use crate::detect::result::PoseData;
use crate::frame::RgbFrame;
use crate::ingest::open_image;

pub struct ImageDetector {
    engine: OwnedEngine,
    path: PathBuf,
    buffers: BufferSlot,
    lifecycle: Lifecycle,
}

impl ImageDetector {
    /// Configure and start `engine` for per-call frames from `path`.
    pub fn new(
        engine: Arc<dyn PoseEngine>,
        options: EngineOptions,
        path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let lifecycle = Lifecycle::new();
        let engine = OwnedEngine::start(engine, &options.without_producer())?;
        lifecycle.configured();
        Ok(Self {
            engine,
            path: path.into(),
            buffers: BufferSlot::default(),
            lifecycle,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detect on the configured image file. `None` when the file cannot be
    /// decoded or the engine yields no datum.
    pub fn process_file(&self) -> Option<PoseData> {
        match open_image(&self.path) {
            Ok(frame) => self.process_frame(&frame),
            Err(err) => {
                log::warn!("{:#}", err);
                None
            }
        }
    }

    /// Detect on one frame.
    ///
    /// On success the payload is copied out of the engine buffer, and only then
    /// is the engine disposed: a single-shot detector never processes a second
    /// frame.
    pub fn process_frame(&self, frame: &RgbFrame) -> Option<PoseData> {
        let buffer = match self.engine.process_frame(frame) {
            Ok(buffer) => buffer,
            Err(err) => {
                log::warn!("{}: image could not be processed: {:#}", self.path.display(), err);
                return None;
            }
        };

        let payload = match buffer.try_get() {
            BufferRead::Data(data) => data.into_iter().next(),
            BufferRead::Empty => None,
            BufferRead::Unavailable => {
                log::warn!("{}: engine result could not be read", self.path.display());
                None
            }
        };
        self.buffers.replace(buffer);

        if payload.is_none() {
            log::warn!("{}: no datum produced", self.path.display());
            return None;
        }
        self.engine.dispose();
        payload
    }
}

impl Detector for ImageDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::SingleShot
    }

    fn state(&self) -> DetectorState {
        self.lifecycle.current()
    }

    fn run(&self, sink: &mut dyn ResultSink) -> Result<()> {
        self.lifecycle.begin_run()?;
        log::info!("detecting on image {}", self.path.display());

        let mut emitter = Emitter::new(sink);
        let exit = match self.process_file() {
            Some(payload) => {
                emitter.emit(payload);
                RunExit::Exhausted
            }
            None if self.lifecycle.stop_requested() => RunExit::Stopped,
            None => RunExit::Exhausted,
        };
        emitter.finish();

        self.buffers.release();
        self.engine.dispose();
        self.lifecycle.finish(exit);
        Ok(())
    }

    /// Single-shot cancellation disposes the engine, failing any in-flight call.
    fn stop(&self) {
        self.lifecycle.request_stop();
        if self.engine.dispose() {
            log::info!("image detector stopped; engine disposed");
        }
        self.lifecycle.stopped();
    }

    fn dispose_data(&self) {
        self.buffers.release();
    }
}
