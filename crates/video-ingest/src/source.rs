//! Reconnecting frame source.
//!
//! [`FrameSource`] wraps a [`CaptureOpener`] with a liveness timer. When no frame has
//! arrived within the staleness window it releases the handle, reopens the descriptor,
//! resets the timer, and waits a fixed delay before reading again. Consecutive attempts
//! are bounded; a successful frame resets the count.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    capture::{CaptureOpener, CaptureRead, FrameCapture},
    types::{CaptureError, Frame, SourceDescriptor},
};

/// Staleness and retry limits for [`FrameSource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Time without a frame before a reconnect is attempted.
    pub stale_after: Duration,
    /// Consecutive reconnect attempts allowed before giving up.
    pub max_attempts: u32,
    /// Pause after each reconnect attempt.
    pub retry_delay: Duration,
    /// Upper bound on a single blocking read.
    pub poll_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(5),
            max_attempts: 5,
            retry_delay: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Fatal: the source stayed silent through every allowed reconnect attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no frames from {uri} after {attempts} reconnect attempts")]
pub struct ReconnectExhausted {
    pub uri: String,
    pub attempts: u32,
}

/// Outcome of [`FrameSource::read`] that does not end the stream.
#[derive(Debug)]
pub enum SourceRead {
    Frame(Frame),
    /// No frame this time (timeout, closed handle, or a reconnect just happened).
    Pending,
}

/// Point-in-time view of the liveness tracker.
#[derive(Clone, Copy, Debug)]
pub struct Liveness {
    pub since_last_frame: Duration,
    pub reconnect_attempts: u32,
    pub connected: bool,
}

pub struct FrameSource {
    opener: Arc<dyn CaptureOpener>,
    descriptor: SourceDescriptor,
    handle: Option<Box<dyn FrameCapture>>,
    policy: ReconnectPolicy,
    last_frame_at: Instant,
    attempts: u32,
}

impl FrameSource {
    /// Open `descriptor` once. Failure here is reported to the caller rather than retried.
    pub fn open(
        opener: Arc<dyn CaptureOpener>,
        descriptor: SourceDescriptor,
        policy: ReconnectPolicy,
    ) -> Result<Self, CaptureError> {
        let handle = opener.open(&descriptor)?;
        info!("Opened video source {descriptor}");
        Ok(Self {
            opener,
            descriptor,
            handle: Some(handle),
            policy,
            last_frame_at: Instant::now(),
            attempts: 0,
        })
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    /// Read the next frame, reconnecting when the source has gone stale.
    ///
    /// Blocks for at most `poll_interval`, or `retry_delay` when a reconnect happens.
    pub fn read(&mut self) -> Result<SourceRead, ReconnectExhausted> {
        if self.last_frame_at.elapsed() > self.policy.stale_after {
            if self.attempts >= self.policy.max_attempts {
                error!(
                    "No frames from {} after {} reconnect attempts; giving up",
                    self.descriptor, self.attempts
                );
                self.release();
                return Err(ReconnectExhausted {
                    uri: self.descriptor.to_string(),
                    attempts: self.attempts,
                });
            }
            self.attempts += 1;
            warn!(
                "No frames from {} for {:?}; reconnecting (attempt {}/{})",
                self.descriptor, self.policy.stale_after, self.attempts, self.policy.max_attempts
            );
            self.reconnect();
            return Ok(SourceRead::Pending);
        }

        let Some(handle) = self.handle.as_mut() else {
            thread::sleep(self.policy.poll_interval);
            return Ok(SourceRead::Pending);
        };

        match handle.read(self.policy.poll_interval) {
            CaptureRead::Frame(frame) => {
                self.last_frame_at = Instant::now();
                if self.attempts > 0 {
                    info!(
                        "Video source {} recovered after {} attempt(s)",
                        self.descriptor, self.attempts
                    );
                }
                self.attempts = 0;
                Ok(SourceRead::Frame(frame))
            }
            CaptureRead::Empty => Ok(SourceRead::Pending),
            CaptureRead::Closed => {
                warn!("Video source {} closed; waiting for reconnect", self.descriptor);
                self.release();
                Ok(SourceRead::Pending)
            }
        }
    }

    pub fn liveness(&self) -> Liveness {
        Liveness {
            since_last_frame: self.last_frame_at.elapsed(),
            reconnect_attempts: self.attempts,
            connected: self.handle.is_some(),
        }
    }

    /// Release the underlying handle. Further reads will reconnect once stale.
    pub fn close(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }

    fn reconnect(&mut self) {
        metrics::counter!("capture_reconnect_attempts_total").increment(1);
        self.release();
        match self.opener.open(&self.descriptor) {
            Ok(handle) => self.handle = Some(handle),
            Err(err) => warn!("Reconnect to {} failed: {err}", self.descriptor),
        }
        self.last_frame_at = Instant::now();
        thread::sleep(self.policy.retry_delay);
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}
