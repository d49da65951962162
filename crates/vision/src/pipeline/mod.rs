//! Detection pipeline lifecycle.
//!
//! A [`DetectionPipeline`] owns one background worker at a time. The worker reads from a
//! reconnecting [`FrameSource`], runs inference on every Nth frame, and publishes the
//! latest frame and detection list into a shared [`snapshot::Snapshot`] cell. Callers
//! start and stop runs and read the most recent snapshot from any thread.

pub mod config;
pub mod health;
pub mod snapshot;
pub mod telemetry;
mod worker;

use std::{
    io,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use ml_core::Inference;
use nav_geo::GeoPoint;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use video_ingest::{CaptureError, CaptureOpener, Frame, FrameSource, SourceDescriptor};

use crate::{annotate::annotate, detection::Detection};

use self::{
    config::PipelineConfig,
    health::{HealthComponent, HealthReport, PipelineHealth, current_millis},
    snapshot::{Snapshot, SnapshotCell},
    worker::Worker,
};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Why the most recent run ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PipelineExit {
    StoppedByCaller,
    ReconnectExhausted { uri: String, attempts: u32 },
    WorkerFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopStatus {
    Stopped,
    NotRunning,
    /// Another start or stop is mid-flight.
    InProgress,
    /// The worker did not exit within the join timeout and was detached.
    TimedOut,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("detection pipeline is already {0:?}")]
    AlreadyRunning(PipelineState),
    #[error("video source unavailable: {0}")]
    SourceUnavailable(#[source] CaptureError),
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to spawn detection worker: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Clone, Debug, Serialize)]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub last_exit: Option<PipelineExit>,
    pub location: Option<GeoPoint>,
    pub health: HealthReport,
    /// Component silent for longer than the source staleness window, if any.
    pub stale_component: Option<HealthComponent>,
}

struct Lifecycle {
    state: PipelineState,
    last_exit: Option<PipelineExit>,
    /// Bumped on every start and stop; worker results carry the value of their run.
    generation: u64,
}

pub(crate) struct Shared {
    lifecycle: Mutex<Lifecycle>,
    pub(crate) snapshot: SnapshotCell,
    pub(crate) location: Mutex<Option<GeoPoint>>,
    pub(crate) health: PipelineHealth,
}

impl Shared {
    /// Called by a worker as it exits on its own.
    pub(crate) fn finish(&self, generation: u64, exit: PipelineExit) {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.generation != generation
            || !matches!(
                lifecycle.state,
                PipelineState::Starting | PipelineState::Running
            )
        {
            return;
        }
        match &exit {
            PipelineExit::StoppedByCaller => info!("Detection pipeline stopped"),
            other => warn!("Detection pipeline exited: {other:?}"),
        }
        lifecycle.state = PipelineState::Stopped;
        lifecycle.last_exit = Some(exit);
    }
}

struct WorkerHandle {
    running: Arc<AtomicBool>,
    done: Receiver<()>,
    thread: JoinHandle<()>,
}

pub struct DetectionPipeline {
    opener: Arc<dyn CaptureOpener>,
    inference: Arc<Mutex<Box<dyn Inference>>>,
    config: PipelineConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl DetectionPipeline {
    pub fn new(
        opener: Arc<dyn CaptureOpener>,
        inference: Box<dyn Inference>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            opener,
            inference: Arc::new(Mutex::new(inference)),
            config,
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(Lifecycle {
                    state: PipelineState::Stopped,
                    last_exit: None,
                    generation: 0,
                }),
                snapshot: SnapshotCell::default(),
                location: Mutex::new(None),
                health: PipelineHealth::new(),
            }),
            worker: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Open `source` and start the worker. A `location` replaces the stored one.
    pub fn start(&self, source: &str, location: Option<GeoPoint>) -> Result<(), PipelineError> {
        let generation = {
            let mut lifecycle = lock(&self.shared.lifecycle);
            if lifecycle.state != PipelineState::Stopped {
                return Err(PipelineError::AlreadyRunning(lifecycle.state));
            }
            lifecycle.state = PipelineState::Starting;
            lifecycle.generation += 1;
            lifecycle.generation
        };

        let launched = self.launch(source, location, generation);
        let mut lifecycle = lock(&self.shared.lifecycle);
        match launched {
            Ok(()) => {
                if lifecycle.generation == generation && lifecycle.state == PipelineState::Starting
                {
                    lifecycle.state = PipelineState::Running;
                }
                metrics::counter!("vision_pipeline_starts_total").increment(1);
                info!("Detection pipeline started on {source}");
                Ok(())
            }
            Err(err) => {
                if lifecycle.generation == generation {
                    lifecycle.state = PipelineState::Stopped;
                }
                warn!("Detection pipeline failed to start: {err}");
                Err(err)
            }
        }
    }

    fn launch(
        &self,
        source: &str,
        location: Option<GeoPoint>,
        generation: u64,
    ) -> Result<(), PipelineError> {
        let descriptor = SourceDescriptor::parse(source).map_err(PipelineError::SourceUnavailable)?;
        self.reap_worker();
        if let Some(location) = location {
            *lock(&self.shared.location) = Some(location);
        }

        let source = FrameSource::open(Arc::clone(&self.opener), descriptor, self.config.reconnect)
            .map_err(PipelineError::SourceUnavailable)?;
        self.shared.snapshot.reset(generation);
        self.shared.health.reset();

        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let worker = Worker {
            source,
            inference: Arc::clone(&self.inference),
            shared: Arc::clone(&self.shared),
            config: self.config.clone(),
            running: Arc::clone(&running),
            generation,
            done: done_tx,
        };
        let thread = telemetry::spawn_thread("detection-worker", move || worker.run())
            .map_err(PipelineError::Spawn)?;

        *lock(&self.worker) = Some(WorkerHandle {
            running,
            done: done_rx,
            thread,
        });
        Ok(())
    }

    /// Drop the handle of a worker that already ended on its own.
    fn reap_worker(&self) {
        if let Some(handle) = lock(&self.worker).take() {
            if handle.thread.is_finished() {
                let _ = handle.thread.join();
            } else {
                debug!("Previous detection worker still winding down; detaching");
            }
        }
    }

    /// Signal the worker, wait up to the join timeout, and clear published state.
    pub fn stop(&self) -> StopStatus {
        let (generation, was_running) = {
            let mut lifecycle = lock(&self.shared.lifecycle);
            match lifecycle.state {
                PipelineState::Stopped => {
                    lifecycle.generation += 1;
                    (lifecycle.generation, false)
                }
                PipelineState::Starting | PipelineState::Stopping => {
                    return StopStatus::InProgress;
                }
                PipelineState::Running => {
                    lifecycle.state = PipelineState::Stopping;
                    lifecycle.generation += 1;
                    (lifecycle.generation, true)
                }
            }
        };
        if !was_running {
            // A run that ended on its own leaves its last snapshot published.
            self.shared.snapshot.reset(generation);
            self.reap_worker();
            return StopStatus::NotRunning;
        }

        let handle = lock(&self.worker).take();
        let status = match handle {
            Some(handle) => self.join_worker(handle),
            None => StopStatus::Stopped,
        };
        self.shared.snapshot.reset(generation);

        let mut lifecycle = lock(&self.shared.lifecycle);
        lifecycle.state = PipelineState::Stopped;
        lifecycle.last_exit = Some(PipelineExit::StoppedByCaller);
        info!("Detection pipeline stopped ({status:?})");
        status
    }

    fn join_worker(&self, handle: WorkerHandle) -> StopStatus {
        handle.running.store(false, Ordering::Release);
        match handle.done.recv_timeout(self.config.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.thread.join().is_err() {
                    warn!("Detection worker panicked");
                }
                StopStatus::Stopped
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Detection worker did not exit within {:?}; detaching it",
                    self.config.join_timeout
                );
                metrics::counter!("vision_worker_detached_total").increment(1);
                StopStatus::TimedOut
            }
        }
    }

    pub fn state(&self) -> PipelineState {
        lock(&self.shared.lifecycle).state
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    pub fn status(&self) -> PipelineStatus {
        let (state, last_exit) = {
            let lifecycle = lock(&self.shared.lifecycle);
            (lifecycle.state, lifecycle.last_exit.clone())
        };
        let now = current_millis();
        let stale_after_ms = self.config.reconnect.stale_after.as_millis() as u64;
        PipelineStatus {
            state,
            last_exit,
            location: self.location(),
            health: self.shared.health.report(now),
            stale_component: match state {
                PipelineState::Running => self.shared.health.stale_component(now, stale_after_ms),
                _ => None,
            },
        }
    }

    /// Detections from the most recent inferred frame.
    pub fn detections(&self) -> Vec<Detection> {
        self.shared.snapshot.detections()
    }

    /// Obstacle detections that carry a geographic position.
    pub fn detected_obstacles(&self) -> Vec<Detection> {
        self.detections()
            .into_iter()
            .filter(|det| det.is_obstacle && det.geo_position.is_some())
            .collect()
    }

    pub fn frame(&self) -> Option<Arc<Frame>> {
        self.shared.snapshot.frame()
    }

    /// Latest frame with the current detections drawn on it.
    pub fn annotated_frame(&self) -> Option<Frame> {
        let snapshot = self.snapshot();
        let frame = snapshot.frame?;
        match annotate(&frame, &snapshot.detections) {
            Ok(annotated) => Some(annotated),
            Err(err) => {
                warn!("Serving unannotated frame: {err}");
                Some(Frame::clone(&frame))
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shared.snapshot.snapshot()
    }

    /// Takes effect from the next inferred frame.
    pub fn update_location(&self, location: GeoPoint) {
        *lock(&self.shared.location) = Some(location);
    }

    pub fn location(&self) -> Option<GeoPoint> {
        *lock(&self.shared.location)
    }
}

impl Drop for DetectionPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
