//! Pipeline driver.
//!
//! Runs a detector on a background thread and hands every result to a
//! consumer callback on a second thread. The two threads meet on a rendezvous
//! channel: while the consumer is busy with one result, the detector can
//! produce at most one more and then blocks handing it over.
//!
//! After each callback the driver calls `dispose_data`, which releases the
//! detector's latest native buffer. Because of that one-result lead, the
//! buffer may already belong to the next frame rather than the one just
//! delivered. Payloads are owned copies, so neither result is affected. The
//! final sentinel ends delivery.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};

use crate::detect::{DetectionResult, Detector, ResultSink};

const DETECT_THREAD: &str = "pose-detect";
const DELIVER_THREAD: &str = "pose-deliver";
const STOP_THREAD: &str = "pose-stop";

pub struct Pipeline;

impl Pipeline {
    /// Start `detector` and deliver its results to `on_result`.
    ///
    /// `on_result` is called once per result, in production order, never
    /// concurrently with itself. The final sentinel is delivered last.
    pub fn start<F>(detector: Arc<dyn Detector>, on_result: F) -> Result<PipelineHandle>
    where
        F: FnMut(&DetectionResult) + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(0);

        let delivery = {
            let detector = detector.clone();
            thread::Builder::new()
                .name(DELIVER_THREAD.to_string())
                .spawn(move || deliver(rx, detector, on_result))
                .context("failed to spawn delivery thread")?
        };
        let production = {
            let detector = detector.clone();
            thread::Builder::new()
                .name(DETECT_THREAD.to_string())
                .spawn(move || {
                    let mut sink = ChannelSink::new(tx);
                    detector.run(&mut sink)
                })
                .context("failed to spawn detection thread")?
        };
        log::info!("{:?} pipeline started", detector.kind());

        Ok(PipelineHandle {
            detector,
            production: Some(production),
            delivery: Some(delivery),
        })
    }

    /// Stop `detector` off the caller's thread, then release its last buffer.
    ///
    /// Returns immediately; join the handle to wait for the stop to complete.
    pub fn request_stop(detector: &Arc<dyn Detector>) -> Result<JoinHandle<()>> {
        let detector = detector.clone();
        thread::Builder::new()
            .name(STOP_THREAD.to_string())
            .spawn(move || {
                log::info!("stop requested");
                detector.stop();
                detector.dispose_data();
            })
            .context("failed to spawn stop thread")
    }
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    detector: Arc<dyn Detector>,
    production: Option<JoinHandle<Result<()>>>,
    delivery: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn detector(&self) -> &Arc<dyn Detector> {
        &self.detector
    }

    pub fn request_stop(&self) -> Result<JoinHandle<()>> {
        Pipeline::request_stop(&self.detector)
    }

    /// True once both the detection and the delivery thread have exited.
    pub fn is_finished(&self) -> bool {
        let done = |handle: Option<bool>| handle.unwrap_or(true);
        done(self.production.as_ref().map(|h| h.is_finished()))
            && done(self.delivery.as_ref().map(|h| h.is_finished()))
    }

    /// Wait for the run to end and every result to be delivered.
    pub fn join(mut self) -> Result<()> {
        let run = match self.production.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("detection thread panicked"))?,
            None => Ok(()),
        };
        if let Some(handle) = self.delivery.take() {
            handle
                .join()
                .map_err(|_| anyhow!("delivery thread panicked"))?;
        }
        run
    }
}

struct ChannelSink {
    tx: SyncSender<DetectionResult>,
    disconnected: bool,
}

impl ChannelSink {
    fn new(tx: SyncSender<DetectionResult>) -> Self {
        Self {
            tx,
            disconnected: false,
        }
    }
}

impl ResultSink for ChannelSink {
    fn report(&mut self, result: DetectionResult) {
        if self.disconnected {
            return;
        }
        if self.tx.send(result).is_err() {
            log::warn!("result consumer has gone away; dropping further results");
            self.disconnected = true;
        }
    }
}

fn deliver<F>(rx: Receiver<DetectionResult>, detector: Arc<dyn Detector>, mut on_result: F)
where
    F: FnMut(&DetectionResult),
{
    let mut delivered = 0u64;
    for result in rx {
        let is_final = result.is_final;
        on_result(&result);
        drop(result);
        detector.dispose_data();
        delivered += 1;
        if is_final {
            break;
        }
    }
    log::debug!("delivery finished after {} results", delivered);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectorKind, DetectorState, PoseData};
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Emits `frames` results, then the sentinel, unless stopped first.
    struct CountingDetector {
        frames: u64,
        stop: AtomicBool,
        disposals: AtomicUsize,
        produced: AtomicU64,
    }

    impl CountingDetector {
        fn new(frames: u64) -> Self {
            Self {
                frames,
                stop: AtomicBool::new(false),
                disposals: AtomicUsize::new(0),
                produced: AtomicU64::new(0),
            }
        }

        fn report(&self, sink: &mut dyn ResultSink, result: DetectionResult) {
            self.produced.fetch_add(1, Ordering::SeqCst);
            sink.report(result);
        }
    }

    impl Detector for CountingDetector {
        fn kind(&self) -> DetectorKind {
            DetectorKind::Streaming
        }

        fn state(&self) -> DetectorState {
            DetectorState::Running
        }

        fn run(&self, sink: &mut dyn ResultSink) -> Result<()> {
            let mut sequence = 0;
            while sequence < self.frames && !self.stop.load(Ordering::SeqCst) {
                let payload = PoseData {
                    frame_index: sequence,
                    ..PoseData::default()
                };
                self.report(sink, DetectionResult::frame(sequence, payload));
                sequence += 1;
            }
            self.report(sink, DetectionResult::finished(sequence));
            Ok(())
        }

        fn stop(&self) {
            self.stop.store(true, Ordering::SeqCst);
        }

        fn dispose_data(&self) {
            self.disposals.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn delivers_in_order_and_disposes_after_each() -> Result<()> {
        let detector = Arc::new(CountingDetector::new(5));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let seen = seen.clone();
            Pipeline::start(detector.clone(), move |result: &DetectionResult| {
                seen.lock().unwrap().push((result.sequence, result.is_final));
            })?
        };
        handle.join()?;

        let seen = seen.lock().unwrap();
        let sequences: Vec<u64> = seen.iter().map(|(s, _)| *s).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4, 5]);
        assert!(seen.iter().take(5).all(|(_, is_final)| !is_final));
        assert!(seen[5].1);
        assert_eq!(detector.disposals.load(Ordering::SeqCst), 6);
        Ok(())
    }

    #[test]
    fn producer_stays_at_most_one_result_ahead() -> Result<()> {
        let detector = Arc::new(CountingDetector::new(6));
        let leads = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let counter = detector.clone();
            let leads = leads.clone();
            Pipeline::start(detector.clone(), move |result: &DetectionResult| {
                thread::sleep(Duration::from_millis(10));
                let produced = counter.produced.load(Ordering::SeqCst);
                leads.lock().unwrap().push(produced - (result.sequence + 1));
            })?
        };
        handle.join()?;

        let leads = leads.lock().unwrap();
        assert_eq!(leads.len(), 7);
        assert!(leads.iter().all(|ahead| *ahead <= 1), "leads: {:?}", leads);
        Ok(())
    }

    #[test]
    fn run_error_surfaces_on_join() -> Result<()> {
        struct Failing;
        impl Detector for Failing {
            fn kind(&self) -> DetectorKind {
                DetectorKind::SingleShot
            }
            fn state(&self) -> DetectorState {
                DetectorState::Completed
            }
            fn run(&self, _sink: &mut dyn ResultSink) -> Result<()> {
                Err(anyhow!("detector has already been run"))
            }
            fn stop(&self) {}
            fn dispose_data(&self) {}
        }

        let handle = Pipeline::start(Arc::new(Failing), |_: &DetectionResult| {})?;
        assert!(handle.join().is_err());
        Ok(())
    }

    #[test]
    fn request_stop_runs_stop_then_dispose() -> Result<()> {
        let detector = Arc::new(CountingDetector::new(0));
        let as_dyn: Arc<dyn Detector> = detector.clone();
        Pipeline::request_stop(&as_dyn)?
            .join()
            .map_err(|_| anyhow!("stop thread panicked"))?;
        assert!(detector.stop.load(Ordering::SeqCst));
        assert_eq!(detector.disposals.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
