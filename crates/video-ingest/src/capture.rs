//! Capability traits implemented by concrete capture backends.

use std::time::Duration;

use crate::types::{CaptureError, Frame, SourceDescriptor};

/// Result of a single bounded read from an open capture handle.
#[derive(Debug, Clone)]
pub enum CaptureRead {
    Frame(Frame),
    /// Nothing arrived within the timeout; the handle is still usable.
    Empty,
    /// The stream ended or the backend failed; the handle must be reopened.
    Closed,
}

/// An open capture handle.
pub trait FrameCapture: Send {
    /// Wait at most `timeout` for the next frame.
    fn read(&mut self, timeout: Duration) -> CaptureRead;

    /// Release the underlying device or process. Must be idempotent.
    fn close(&mut self);
}

/// Factory for capture handles, kept by the [`crate::FrameSource`] so it can reopen
/// the same descriptor after a stall.
pub trait CaptureOpener: Send + Sync {
    fn open(&self, source: &SourceDescriptor) -> Result<Box<dyn FrameCapture>, CaptureError>;
}
