//! Obstacle detection over a live video source.

pub mod annotate;
pub mod classify;
pub mod detection;
pub mod pipeline;

pub use annotate::{AnnotationError, annotate};
pub use classify::{DistanceEstimator, ObstacleClasses};
pub use detection::{Detection, DetectionContext, build_detections};
pub use pipeline::{
    DetectionPipeline, PipelineError, PipelineExit, PipelineState, PipelineStatus, StopStatus,
    config::{PipelineCliArgs, PipelineConfig},
    health::{HealthComponent, HealthReport},
    snapshot::Snapshot,
    telemetry,
};
