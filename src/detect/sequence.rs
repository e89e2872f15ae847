//! Streaming detector: the engine pulls frames from a video, an image
//! directory or a camera, and the detector pops one result per frame.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::detect::buffer::{BufferRead, BufferSlot};
use crate::detect::detector::{
    Detector, DetectorKind, DetectorState, Emitter, Lifecycle, OwnedEngine, ResultSink, RunExit,
};
use crate::detect::engine::{EngineOptions, PoseEngine, Producer};

pub struct SequenceDetector {
    engine: OwnedEngine,
    producer: Producer,
    exit_requested: AtomicBool,
    buffers: BufferSlot,
    lifecycle: Lifecycle,
}

impl SequenceDetector {
    pub fn new(
        engine: Arc<dyn PoseEngine>,
        options: EngineOptions,
        producer: Producer,
    ) -> Result<Self> {
        let lifecycle = Lifecycle::new();
        let engine = OwnedEngine::start(engine, &options.with_producer(producer.clone()))?;
        lifecycle.configured();
        Ok(Self {
            engine,
            producer,
            exit_requested: AtomicBool::new(false),
            buffers: BufferSlot::default(),
            lifecycle,
        })
    }

    pub fn camera(engine: Arc<dyn PoseEngine>, options: EngineOptions, index: i32) -> Result<Self> {
        Self::new(engine, options, Producer::Camera(index))
    }

    pub fn video(
        engine: Arc<dyn PoseEngine>,
        options: EngineOptions,
        path: impl Into<PathBuf>,
    ) -> Result<Self> {
        Self::new(engine, options, Producer::Video(path.into()))
    }

    pub fn image_dir(
        engine: Arc<dyn PoseEngine>,
        options: EngineOptions,
        dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        Self::new(engine, options, Producer::ImageDir(dir.into()))
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::SeqCst)
    }
}

impl Detector for SequenceDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Streaming
    }

    fn state(&self) -> DetectorState {
        self.lifecycle.current()
    }

    fn run(&self, sink: &mut dyn ResultSink) -> Result<()> {
        self.lifecycle.begin_run()?;
        log::info!("streaming from {:?} ({} engine)", self.producer, self.engine.name());

        let mut emitter = Emitter::new(sink);
        let exit = loop {
            if self.exit_requested() {
                log::info!("stop requested; leaving detection loop");
                break RunExit::Stopped;
            }
            match self.engine.wait_and_pop() {
                Ok(Some(buffer)) => match buffer.try_get() {
                    BufferRead::Data(data) => {
                        self.buffers.replace(buffer);
                        if data.len() > 1 {
                            log::debug!("{} datums for one frame; reporting the first", data.len());
                        }
                        if let Some(datum) = data.into_iter().next() {
                            emitter.emit(datum);
                        }
                    }
                    BufferRead::Empty => log::debug!("engine produced an empty datum collection"),
                    BufferRead::Unavailable => log::warn!("engine result could not be read"),
                },
                Ok(None) => {
                    log::info!("input exhausted");
                    break RunExit::Exhausted;
                }
                Err(err) => {
                    log::warn!("processed datum could not be emplaced: {:#}", err);
                    break RunExit::Exhausted;
                }
            }
        };

        emitter.finish();
        log::info!("streaming finished after {} results", emitter.emitted());

        self.engine.dispose();
        self.buffers.release();
        self.lifecycle.finish(exit);
        Ok(())
    }

    /// Ask the loop to exit. The current pull is allowed to complete.
    fn stop(&self) {
        self.exit_requested.store(true, Ordering::SeqCst);
        self.lifecycle.request_stop();
    }

    fn dispose_data(&self) {
        self.buffers.release();
    }
}
