//! Model-facing types: the inference capability the detection pipeline calls and the
//! raw boxes it returns. Concrete models live outside this workspace and plug in by
//! implementing [`Inference`].

pub mod detector;

pub use detector::{BoundingBox, Inference, InferenceDetection, InferenceError};
