use anyhow::Error;
use serde::Serialize;
use thiserror::Error;
use video_ingest::Frame;

/// Axis-aligned box in frame pixels, `(x1, y1)` top-left to `(x2, y2)` bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// Single detection returned by a model, before any filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceDetection {
    pub bbox: BoundingBox,
    pub score: f32,
    pub class_label: String,
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(String),
    #[error("model failure: {0}")]
    Model(#[from] Error),
}

/// Object inference capability.
///
/// Called from the pipeline worker thread only, so implementations may keep mutable
/// per-model state (sessions, scratch tensors) without extra locking.
pub trait Inference: Send {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<InferenceDetection>, InferenceError>;
}

impl<F> Inference for F
where
    F: FnMut(&Frame) -> Result<Vec<InferenceDetection>, InferenceError> + Send,
{
    fn infer(&mut self, frame: &Frame) -> Result<Vec<InferenceDetection>, InferenceError> {
        self(frame)
    }
}
