use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use crate::detect::buffer::NativeBuffer;
use crate::detect::engine::{EngineOptions, PoseEngine};
use crate::detect::result::{DetectionResult, PoseData, SensorImages};
use crate::frame::RgbFrame;

/// Lifecycle of a detector.
///
/// `Created -> Configured -> Running -> {Stopping -> Stopped | Completed}`.
/// `Stopped` and `Completed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorState {
    Created,
    Configured,
    Running,
    Stopping,
    Stopped,
    Completed,
}

impl DetectorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DetectorState::Stopped | DetectorState::Completed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
    /// One frame, one result.
    SingleShot,
    /// Frames pulled by the engine from a video, image directory or camera.
    Streaming,
    /// Colour+depth pairs from a depth-sensing camera.
    Sensor,
}

/// Receives detection results in production order.
pub trait ResultSink {
    fn report(&mut self, result: DetectionResult);
}

impl<F: FnMut(DetectionResult)> ResultSink for F {
    fn report(&mut self, result: DetectionResult) {
        self(result)
    }
}

/// Detector contract shared by every input modality.
///
/// `run` blocks until the run is over and must be called at most once.
/// `stop` and `dispose_data` may be called from other threads while `run` is
/// in progress.
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    fn state(&self) -> DetectorState;

    /// Process the input, reporting every result to `sink`.
    ///
    /// The last result reported is always the `is_final` sentinel. Acquisition
    /// failures end the run normally; an error is returned only when the
    /// detector has already been run.
    fn run(&self, sink: &mut dyn ResultSink) -> Result<()>;

    /// Request early termination.
    fn stop(&self);

    /// Release the native buffer behind the most recent result.
    fn dispose_data(&self);
}

/// Tags results with sequence numbers and guarantees a single final sentinel.
pub(crate) struct Emitter<'a> {
    sink: &'a mut dyn ResultSink,
    next_sequence: u64,
    finished: bool,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(sink: &'a mut dyn ResultSink) -> Self {
        Self {
            sink,
            next_sequence: 0,
            finished: false,
        }
    }

    pub(crate) fn emit(&mut self, payload: PoseData) {
        self.send(|sequence| DetectionResult::frame(sequence, payload));
    }

    pub(crate) fn emit_sensor(&mut self, payload: Option<PoseData>, images: SensorImages) {
        self.send(|sequence| DetectionResult::sensor_frame(sequence, payload, images));
    }

    pub(crate) fn finish(&mut self) {
        self.send(DetectionResult::finished);
        self.finished = true;
    }

    /// Number of results handed to the sink so far.
    pub(crate) fn emitted(&self) -> u64 {
        self.next_sequence
    }

    fn send(&mut self, build: impl FnOnce(u64) -> DetectionResult) {
        if self.finished {
            log::debug!("result dropped after final sentinel");
            return;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.sink.report(build(sequence));
    }
}

/// Why a detection loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RunExit {
    /// The source ran out, failed, or never opened.
    Exhausted,
    /// The loop observed a stop request.
    Stopped,
}

/// State machine plus the run-once guard.
pub(crate) struct Lifecycle {
    state: Mutex<DetectorState>,
    ran: AtomicBool,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(DetectorState::Created),
            ran: AtomicBool::new(false),
        }
    }

    pub(crate) fn current(&self) -> DetectorState {
        *self.lock()
    }

    pub(crate) fn configured(&self) {
        let mut state = self.lock();
        if *state == DetectorState::Created {
            *state = DetectorState::Configured;
        }
    }

    pub(crate) fn begin_run(&self) -> Result<()> {
        if self.ran.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("detector has already been run"));
        }
        let mut state = self.lock();
        if *state == DetectorState::Configured {
            *state = DetectorState::Running;
        }
        Ok(())
    }

    /// Enter `Stopping` unless the detector has already finished.
    pub(crate) fn request_stop(&self) {
        let mut state = self.lock();
        if matches!(*state, DetectorState::Configured | DetectorState::Running) {
            *state = DetectorState::Stopping;
        }
    }

    /// Jump straight to `Stopped` (single-shot cancellation).
    pub(crate) fn stopped(&self) {
        let mut state = self.lock();
        if !state.is_terminal() {
            *state = DetectorState::Stopped;
        }
    }

    pub(crate) fn stop_requested(&self) -> bool {
        matches!(self.current(), DetectorState::Stopping | DetectorState::Stopped)
    }

    /// The run is over. The loop's own exit reason decides the terminal state,
    /// so a stop that lands after the source ran dry still reads `Completed`.
    pub(crate) fn finish(&self, exit: RunExit) {
        *self.lock() = match exit {
            RunExit::Stopped => DetectorState::Stopped,
            RunExit::Exhausted => DetectorState::Completed,
        };
    }

    fn lock(&self) -> MutexGuard<'_, DetectorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Engine instance owned by exactly one detector.
///
/// Configured and started on construction; disposed exactly once, either
/// explicitly or on drop.
pub struct OwnedEngine {
    engine: Arc<dyn PoseEngine>,
    disposed: AtomicBool,
}

impl OwnedEngine {
    pub fn start(engine: Arc<dyn PoseEngine>, options: &EngineOptions) -> Result<Self> {
        options.validate()?;
        let owned = Self {
            engine,
            disposed: AtomicBool::new(false),
        };
        // On error `owned` drops here and disposes the engine.
        owned.engine.configure(options)?;
        owned.engine.start()?;
        log::info!(
            "{} engine started (net={}, model={}, face={}, hand={}, output={})",
            owned.engine.name(),
            options.net_resolution,
            options.model_pose,
            options.face_enabled(),
            options.hand_enabled(),
            options.output.is_some()
        );
        Ok(owned)
    }

    pub fn name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn process_frame(&self, frame: &RgbFrame) -> Result<NativeBuffer> {
        if self.is_disposed() {
            return Err(anyhow!("{} engine already disposed", self.engine.name()));
        }
        self.engine.process_frame(frame)
    }

    pub fn wait_and_pop(&self) -> Result<Option<NativeBuffer>> {
        if self.is_disposed() {
            return Ok(None);
        }
        self.engine.wait_and_pop()
    }

    /// Dispose the engine. Returns false when it was already disposed.
    pub fn dispose(&self) -> bool {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.engine.dispose();
        log::debug!("{} engine disposed", self.engine.name());
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for OwnedEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
