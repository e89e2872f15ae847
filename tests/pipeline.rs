use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use pose_stream::detect::backends::StubEngine;
use pose_stream::detect::{
    DetectionResult, Detector, DetectorState, EngineOptions, ImageDetector, SequenceDetector,
};
use pose_stream::Pipeline;

#[derive(Debug, Clone, Copy)]
struct Seen {
    sequence: u64,
    is_final: bool,
    has_payload: bool,
}

fn recorder() -> (Arc<Mutex<Vec<Seen>>>, impl FnMut(&DetectionResult) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let seen = seen.clone();
        move |result: &DetectionResult| {
            seen.lock().unwrap().push(Seen {
                sequence: result.sequence,
                is_final: result.is_final,
                has_payload: result.payload.is_some(),
            });
        }
    };
    (seen, sink)
}

#[test]
fn streaming_results_arrive_in_order_with_one_final() -> Result<()> {
    let engine = StubEngine::new().with_frame_limit(12);
    let probe = engine.probe();
    let detector: Arc<dyn Detector> = Arc::new(SequenceDetector::video(
        Arc::new(engine),
        EngineOptions::default(),
        "walk.mp4",
    )?);

    let (seen, sink) = recorder();
    let handle = Pipeline::start(detector.clone(), sink)?;
    handle.join()?;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 13);
    for (i, result) in seen.iter().enumerate() {
        assert_eq!(result.sequence, i as u64);
    }
    assert!(seen[..12].iter().all(|r| !r.is_final && r.has_payload));
    assert!(seen[12].is_final);
    assert!(!seen[12].has_payload);

    assert_eq!(detector.state(), DetectorState::Completed);
    assert_eq!(probe.disposed(), 1);
    assert_eq!(probe.buffers_released(), probe.buffers_issued());
    Ok(())
}

#[test]
fn slow_consumer_sees_every_result() -> Result<()> {
    let detector: Arc<dyn Detector> = Arc::new(SequenceDetector::video(
        Arc::new(StubEngine::new().with_frame_limit(4)),
        EngineOptions::default(),
        "walk.mp4",
    )?);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let handle = {
        let seen = seen.clone();
        Pipeline::start(detector, move |result: &DetectionResult| {
            thread::sleep(Duration::from_millis(20));
            seen.lock().unwrap().push(result.sequence);
        })?
    };
    handle.join()?;

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    Ok(())
}

#[test]
fn request_stop_ends_unbounded_stream() -> Result<()> {
    let engine = StubEngine::new().with_frame_delay(Duration::from_millis(5));
    let probe = engine.probe();
    let detector: Arc<dyn Detector> = Arc::new(SequenceDetector::camera(
        Arc::new(engine),
        EngineOptions::default(),
        0,
    )?);

    let (seen, sink) = recorder();
    let handle = Pipeline::start(detector, sink)?;
    thread::sleep(Duration::from_millis(100));
    assert!(!handle.is_finished());

    handle
        .request_stop()?
        .join()
        .map_err(|_| anyhow!("stop thread panicked"))?;
    let detector = handle.detector().clone();
    handle.join()?;

    let seen = seen.lock().unwrap();
    let last = seen.last().expect("final result");
    assert!(last.is_final);
    assert_eq!(seen.iter().filter(|r| r.is_final).count(), 1);
    assert_eq!(detector.state(), DetectorState::Stopped);
    assert_eq!(probe.disposed(), 1);
    assert_eq!(probe.buffers_released(), probe.buffers_issued());
    Ok(())
}

#[test]
fn single_shot_pipeline_delivers_payload_then_final() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("person.png");
    RgbImage::from_pixel(10, 10, Rgb([200, 100, 50])).save(&path)?;

    let engine = StubEngine::new();
    let probe = engine.probe();
    let detector: Arc<dyn Detector> = Arc::new(ImageDetector::new(
        Arc::new(engine),
        EngineOptions::default(),
        &path,
    )?);

    let (seen, sink) = recorder();
    Pipeline::start(detector, sink)?.join()?;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].has_payload && !seen[0].is_final);
    assert!(seen[1].is_final);
    assert_eq!(probe.disposed(), 1);
    assert_eq!(probe.buffers_released(), 1);
    Ok(())
}

#[test]
fn second_pipeline_on_same_detector_fails_on_join() -> Result<()> {
    let detector: Arc<dyn Detector> = Arc::new(SequenceDetector::video(
        Arc::new(StubEngine::new().with_frame_limit(1)),
        EngineOptions::default(),
        "walk.mp4",
    )?);

    Pipeline::start(detector.clone(), |_: &DetectionResult| {})?.join()?;

    let (seen, sink) = recorder();
    assert!(Pipeline::start(detector, sink)?.join().is_err());
    assert!(seen.lock().unwrap().is_empty());
    Ok(())
}
