//! Body of the detection worker thread.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use crossbeam_channel::Sender;
use metrics::{counter, histogram};
use ml_core::Inference;
use tracing::{debug, error, info_span, warn};
use video_ingest::{Frame, FrameSource, SourceRead};

use crate::{
    detection::{Detection, DetectionContext, build_detections},
    pipeline::{PipelineExit, Shared, config::PipelineConfig, health::HealthComponent, lock},
};

pub(crate) struct Worker {
    pub(crate) source: FrameSource,
    pub(crate) inference: Arc<Mutex<Box<dyn Inference>>>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) config: PipelineConfig,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) generation: u64,
    pub(crate) done: Sender<()>,
}

/// Records the run's exit on drop, so a panicking worker still leaves the
/// pipeline in `Stopped`.
struct ExitGuard {
    shared: Arc<Shared>,
    generation: u64,
    exit: Option<PipelineExit>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let exit = self.exit.take().unwrap_or(PipelineExit::WorkerFailed);
        self.shared.finish(self.generation, exit);
    }
}

impl Worker {
    pub(crate) fn run(mut self) {
        let span = info_span!(
            "detection_worker",
            source = %self.source.descriptor(),
            generation = self.generation
        );
        let _entered = span.enter();

        let mut guard = ExitGuard {
            shared: Arc::clone(&self.shared),
            generation: self.generation,
            exit: None,
        };
        let exit = self.process_frames();
        self.source.close();
        guard.exit = Some(exit);
        drop(guard);
        let _ = self.done.send(());
    }

    fn process_frames(&mut self) -> PipelineExit {
        let interval = u64::from(self.config.inference_interval.max(1));
        let mut frame_number = 0u64;

        while self.running.load(Ordering::Acquire) {
            match self.source.read() {
                Ok(SourceRead::Frame(frame)) => {
                    frame_number += 1;
                    self.shared.health.beat(HealthComponent::Capture);
                    counter!("vision_frames_captured_total").increment(1);

                    let detections = if frame_number % interval == 0 {
                        self.detect(&frame)
                    } else {
                        None
                    };

                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    if !self.shared.snapshot.publish(
                        self.generation,
                        Arc::new(frame),
                        detections,
                        frame_number,
                    ) {
                        debug!("Run superseded; discarding frame {frame_number}");
                        break;
                    }
                }
                Ok(SourceRead::Pending) => thread::sleep(self.config.transient_retry_delay),
                Err(exhausted) => {
                    error!("Stopping detection: {exhausted}");
                    counter!("vision_reconnect_exhausted_total").increment(1);
                    return PipelineExit::ReconnectExhausted {
                        uri: exhausted.uri,
                        attempts: exhausted.attempts,
                    };
                }
            }
        }

        PipelineExit::StoppedByCaller
    }

    /// `None` when inference failed; the previous detections then stay published.
    fn detect(&self, frame: &Frame) -> Option<Vec<Detection>> {
        let started = Instant::now();
        let result = lock(&self.inference).infer(frame);
        histogram!("vision_inference_latency_ms").record(started.elapsed().as_secs_f64() * 1_000.0);

        match result {
            Ok(raw) => {
                self.shared.health.beat(HealthComponent::Inference);
                counter!("vision_frames_inferred_total").increment(1);
                let location = *lock(&self.shared.location);
                let ctx = DetectionContext {
                    confidence_threshold: self.config.confidence_threshold,
                    classes: &self.config.obstacle_classes,
                    distance: &self.config.distance,
                    projector: self.config.projector,
                    location,
                };
                let detections = build_detections(raw, (frame.width, frame.height), &ctx);
                counter!("vision_detections_total").increment(detections.len() as u64);
                Some(detections)
            }
            Err(err) => {
                self.shared.health.record_inference_failure();
                counter!("vision_inference_failures_total").increment(1);
                warn!("Inference failed; keeping previous detections: {err}");
                None
            }
        }
    }
}
