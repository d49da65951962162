//! Frame ingestion: capture capabilities, an FFmpeg-backed implementation, and the
//! reconnecting [`FrameSource`] the detection pipeline reads from.

pub use capture::{CaptureOpener, CaptureRead, FrameCapture};
pub use ffmpeg::{FfmpegCapture, FfmpegOpener};
pub use source::{FrameSource, Liveness, ReconnectExhausted, ReconnectPolicy, SourceRead};
pub use types::{CaptureError, Frame, FrameFormat, SourceDescriptor};

mod capture;
mod ffmpeg;
mod source;
mod types;
