use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

use crate::detect::buffer::{NativeBuffer, NativeContainer};
use crate::detect::engine::{EngineOptions, PoseEngine, Producer};
use crate::detect::result::{PoseData, PoseKeypoints};
use crate::frame::RgbFrame;
use crate::ingest::list_image_dir;

/// Frames a synthetic video yields when no frame limit is set.
pub const DEFAULT_VIDEO_FRAMES: u64 = 120;

const SYNTHETIC_WIDTH: u32 = 64;
const SYNTHETIC_HEIGHT: u32 = 48;
const FACE_PARTS: usize = 70;
const HAND_PARTS: usize = 21;
const DISPOSE_POLL: Duration = Duration::from_millis(5);

/// Shared counters describing what happened to a `StubEngine`.
#[derive(Debug, Default)]
pub struct EngineProbe {
    configured: AtomicUsize,
    started: AtomicUsize,
    disposed: AtomicUsize,
    buffers_issued: AtomicUsize,
    buffers_released: AtomicUsize,
}

impl EngineProbe {
    pub fn configured(&self) -> usize {
        self.configured.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Number of `dispose` calls that reached the engine.
    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn buffers_issued(&self) -> usize {
        self.buffers_issued.load(Ordering::SeqCst)
    }

    pub fn buffers_released(&self) -> usize {
        self.buffers_released.load(Ordering::SeqCst)
    }
}

/// In-process engine for tests and dry runs.
///
/// Keypoints are derived from a hash of the frame pixels, so identical frames
/// give identical detections. Image directories are read from disk in lexical
/// order; videos and cameras produce synthetic frames.
pub struct StubEngine {
    state: Mutex<StubState>,
    disposed: AtomicBool,
    probe: Arc<EngineProbe>,
    frame_limit: Option<u64>,
    frame_delay: Duration,
    fail_at: Option<u64>,
    empty_at: Option<u64>,
}

#[derive(Default)]
struct StubState {
    options: Option<EngineOptions>,
    started: bool,
    producer: Option<FrameProducer>,
    frame_index: u64,
}

enum FrameProducer {
    Directory(VecDeque<PathBuf>),
    Synthetic { remaining: Option<u64> },
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState::default()),
            disposed: AtomicBool::new(false),
            probe: Arc::new(EngineProbe::default()),
            frame_limit: None,
            frame_delay: Duration::ZERO,
            fail_at: None,
            empty_at: None,
        }
    }

    /// Cap the number of synthetic frames (video and camera inputs).
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Time each detection call takes.
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    /// Fail the pull for frame `index` as if it could not be decoded.
    pub fn with_failure_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Return an empty datum collection for frame `index`.
    pub fn with_empty_frame_at(mut self, index: u64) -> Self {
        self.empty_at = Some(index);
        self
    }

    pub fn probe(&self) -> Arc<EngineProbe> {
        self.probe.clone()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, StubState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Simulate inference time. Returns false if the engine was disposed meanwhile.
    fn simulate_work(&self) -> bool {
        let deadline = Instant::now() + self.frame_delay;
        loop {
            if self.is_disposed() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(DISPOSE_POLL.min(deadline - now));
        }
    }

    fn detect(&self, state: &mut StubState, frame: &RgbFrame) -> Result<NativeBuffer> {
        let index = state.frame_index;
        state.frame_index += 1;

        if self.empty_at == Some(index) {
            return Ok(self.buffer(Vec::new()));
        }

        let options = state
            .options
            .as_ref()
            .ok_or_else(|| anyhow!("stub engine is not configured"))?;
        let datum = synthesize_datum(index, frame, options)?;
        Ok(self.buffer(vec![datum]))
    }

    fn buffer(&self, datums: Vec<PoseData>) -> NativeBuffer {
        self.probe.buffers_issued.fetch_add(1, Ordering::SeqCst);
        NativeBuffer::new(StubContainer {
            datums,
            probe: self.probe.clone(),
        })
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn configure(&self, options: &EngineOptions) -> Result<()> {
        let mut state = self.lock();
        if state.started {
            return Err(anyhow!("cannot reconfigure a started engine"));
        }
        state.options = Some(options.clone());
        self.probe.configured.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(anyhow!("stub engine already disposed"));
        }
        let mut state = self.lock();
        if state.started {
            return Err(anyhow!("stub engine already started"));
        }
        let producer = match state.options.as_ref().map(|o| o.producer.clone()) {
            None => return Err(anyhow!("stub engine must be configured before start")),
            Some(None) => None,
            Some(Some(Producer::ImageDir(dir))) => {
                Some(FrameProducer::Directory(list_image_dir(&dir)?.into()))
            }
            Some(Some(Producer::Video(_))) => Some(FrameProducer::Synthetic {
                remaining: Some(self.frame_limit.unwrap_or(DEFAULT_VIDEO_FRAMES)),
            }),
            Some(Some(Producer::Camera(_))) => Some(FrameProducer::Synthetic {
                remaining: self.frame_limit,
            }),
        };
        state.producer = producer;
        state.started = true;
        self.probe.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn process_frame(&self, frame: &RgbFrame) -> Result<NativeBuffer> {
        if !self.simulate_work() {
            return Err(anyhow!("stub engine disposed during detection"));
        }
        let mut state = self.lock();
        if !state.started {
            return Err(anyhow!("stub engine not started"));
        }
        if frame.is_empty() {
            return Err(anyhow!("frame has no pixels"));
        }
        self.detect(&mut state, frame)
    }

    fn wait_and_pop(&self) -> Result<Option<NativeBuffer>> {
        if !self.simulate_work() {
            return Ok(None);
        }
        let mut state = self.lock();
        if !state.started {
            return Err(anyhow!("stub engine not started"));
        }
        let index = state.frame_index;
        if self.fail_at == Some(index) {
            return Err(anyhow!("could not decode frame {}", index));
        }

        let frame = match state.producer.as_mut() {
            None => return Err(anyhow!("stub engine has no input producer")),
            Some(FrameProducer::Directory(files)) => match files.pop_front() {
                None => return Ok(None),
                Some(path) => RgbFrame::open(&path)?,
            },
            Some(FrameProducer::Synthetic { remaining }) => {
                if let Some(remaining) = remaining {
                    if *remaining == 0 {
                        return Ok(None);
                    }
                    *remaining -= 1;
                }
                synthetic_frame(index)?
            }
        };
        self.detect(&mut state, &frame).map(Some)
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.lock().producer = None;
        self.probe.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

struct StubContainer {
    datums: Vec<PoseData>,
    probe: Arc<EngineProbe>,
}

impl NativeContainer for StubContainer {
    fn read(&self) -> Option<Vec<PoseData>> {
        Some(self.datums.clone())
    }

    fn free(&mut self) {
        self.datums.clear();
        self.probe.buffers_released.fetch_add(1, Ordering::SeqCst);
    }
}

fn parts_for_model(model_pose: &str) -> usize {
    match model_pose.to_ascii_uppercase().as_str() {
        "COCO" => 18,
        "MPI" | "MPI_4_LAYERS" => 15,
        _ => 25,
    }
}

fn synthesize_datum(index: u64, frame: &RgbFrame, options: &EngineOptions) -> Result<PoseData> {
    let digest: [u8; 32] = Sha256::digest(frame.pixels()).into();
    let people = 1 + (digest[0] % 2) as usize;
    let (w, h) = (frame.width() as f32, frame.height() as f32);

    let pose = synthesize_keypoints(&digest, 0, people, parts_for_model(&options.model_pose), w, h)?;
    let face = if options.face_enabled() {
        Some(synthesize_keypoints(&digest, 1, people, FACE_PARTS, w, h)?)
    } else {
        None
    };
    let hands = if options.hand_enabled() {
        Some([
            synthesize_keypoints(&digest, 2, people, HAND_PARTS, w, h)?,
            synthesize_keypoints(&digest, 3, people, HAND_PARTS, w, h)?,
        ])
    } else {
        None
    };

    Ok(PoseData {
        frame_index: index,
        pose,
        face,
        hands,
        rendered: Some(frame.clone()),
    })
}

fn synthesize_keypoints(
    digest: &[u8; 32],
    salt: usize,
    people: usize,
    parts: usize,
    width: f32,
    height: f32,
) -> Result<PoseKeypoints> {
    let byte = |k: usize| digest[(k + salt * 7) % digest.len()] as f32 / 255.0;
    let mut values = Vec::with_capacity(people * parts * 3);
    for k in (0..people * parts).map(|i| i * 3) {
        values.push(byte(k) * width);
        values.push(byte(k + 1) * height);
        values.push(byte(k + 2));
    }
    PoseKeypoints::new(people, parts, values)
}

fn synthetic_frame(index: u64) -> Result<RgbFrame> {
    let len = (SYNTHETIC_WIDTH * SYNTHETIC_HEIGHT * 3) as usize;
    let pixels = (0..len)
        .map(|i| ((i as u64 + index * 3) % 256) as u8)
        .collect();
    RgbFrame::new(pixels, SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::buffer::BufferRead;

    fn started(engine: &StubEngine, options: EngineOptions) {
        engine.configure(&options).unwrap();
        engine.start().unwrap();
    }

    #[test]
    fn identical_frames_give_identical_keypoints() -> Result<()> {
        let engine = StubEngine::new();
        started(&engine, EngineOptions::default());

        let frame = synthetic_frame(3)?;
        let a = engine.process_frame(&frame)?;
        let b = engine.process_frame(&frame)?;
        match (a.try_get(), b.try_get()) {
            (BufferRead::Data(a), BufferRead::Data(b)) => {
                assert_eq!(a[0].pose, b[0].pose);
                assert_eq!(a[0].pose.parts(), 25);
                assert_eq!(a[0].frame_index, 0);
                assert_eq!(b[0].frame_index, 1);
                assert!(a[0].face.is_none());
            }
            other => panic!("unexpected reads: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn sub_detectors_follow_options() -> Result<()> {
        let engine = StubEngine::new();
        let options = EngineOptions {
            face_resolution: Some("368x368".parse()?),
            hand_resolution: Some("368x368".parse()?),
            model_pose: "COCO".to_string(),
            ..EngineOptions::default()
        };
        started(&engine, options);

        let buffer = engine.process_frame(&synthetic_frame(0)?)?;
        let BufferRead::Data(data) = buffer.try_get() else {
            panic!("expected data");
        };
        assert_eq!(data[0].pose.parts(), 18);
        assert_eq!(data[0].face.as_ref().map(|f| f.parts()), Some(FACE_PARTS));
        assert!(data[0].hands.is_some());
        Ok(())
    }

    #[test]
    fn empty_frame_is_rejected() -> Result<()> {
        let engine = StubEngine::new();
        started(&engine, EngineOptions::default());
        assert!(engine
            .process_frame(&RgbFrame::new(Vec::new(), 0, 0)?)
            .is_err());
        Ok(())
    }

    #[test]
    fn synthetic_video_is_finite() -> Result<()> {
        let engine = StubEngine::new().with_frame_limit(2);
        started(
            &engine,
            EngineOptions::default().with_producer(Producer::Video("clip.mp4".into())),
        );
        assert!(engine.wait_and_pop()?.is_some());
        assert!(engine.wait_and_pop()?.is_some());
        assert!(engine.wait_and_pop()?.is_none());
        Ok(())
    }

    #[test]
    fn pull_without_producer_fails() {
        let engine = StubEngine::new();
        started(&engine, EngineOptions::default());
        assert!(engine.wait_and_pop().is_err());
    }

    #[test]
    fn dispose_interrupts_slow_detection() -> Result<()> {
        let engine = Arc::new(StubEngine::new().with_frame_delay(Duration::from_secs(30)));
        started(&engine, EngineOptions::default());

        let worker = {
            let engine = engine.clone();
            std::thread::spawn(move || {
                let frame = synthetic_frame(0).unwrap();
                engine.process_frame(&frame).map(|_| ())
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        engine.dispose();
        assert!(worker.join().unwrap().is_err());
        assert_eq!(engine.probe().disposed(), 1);
        Ok(())
    }

    #[test]
    fn freed_buffers_are_counted() -> Result<()> {
        let engine = StubEngine::new();
        started(&engine, EngineOptions::default());
        let probe = engine.probe();

        let mut buffer = engine.process_frame(&synthetic_frame(0)?)?;
        assert_eq!(probe.buffers_issued(), 1);
        buffer.release();
        drop(buffer);
        assert_eq!(probe.buffers_released(), 1);
        Ok(())
    }
}
