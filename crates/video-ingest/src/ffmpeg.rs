//! FFmpeg subprocess capture backend.
//!
//! FFmpeg decodes the source and writes packed BGR24 frames of a fixed size to stdout;
//! a relay thread slices stdout into [`Frame`]s and forwards them over a bounded
//! channel so a slow consumer backpressures the decoder.

use std::{
    io::Read,
    process::{Child, ChildStdout, Command, Stdio},
    thread,
    time::Duration,
};

use anyhow::{Context, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::{debug, warn};

use crate::{
    capture::{CaptureOpener, CaptureRead, FrameCapture},
    types::{CaptureError, Frame, FrameFormat, SourceDescriptor},
};

/// Opens sources by spawning `ffmpeg`.
#[derive(Clone, Debug)]
pub struct FfmpegOpener {
    pub program: String,
    pub target_size: (u32, u32),
    pub queue_size: usize,
}

impl FfmpegOpener {
    pub fn new(target_size: (u32, u32)) -> Self {
        Self {
            program: "ffmpeg".to_string(),
            target_size,
            queue_size: 4,
        }
    }

    fn command(&self, source: &SourceDescriptor) -> Command {
        let scale_arg = format!("scale={}:{}", self.target_size.0, self.target_size.1);
        let mut cmd = Command::new(&self.program);
        cmd.arg("-hide_banner").arg("-loglevel").arg("error");

        match source {
            SourceDescriptor::Device { index } => {
                cmd.arg("-f")
                    .arg("video4linux2")
                    .arg("-i")
                    .arg(format!("/dev/video{index}"));
            }
            SourceDescriptor::Rtsp { url } => {
                cmd.arg("-rtsp_transport")
                    .arg("tcp")
                    .arg("-fflags")
                    .arg("nobuffer")
                    .arg("-flags")
                    .arg("low_delay")
                    .arg("-max_delay")
                    .arg("0")
                    .arg("-i")
                    .arg(url);
            }
            SourceDescriptor::Stream { uri } => {
                cmd.arg("-i").arg(uri);
            }
        }

        cmd.arg("-an")
            .arg("-vf")
            .arg(&scale_arg)
            .arg("-pix_fmt")
            .arg("bgr24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl CaptureOpener for FfmpegOpener {
    fn open(&self, source: &SourceDescriptor) -> Result<Box<dyn FrameCapture>, CaptureError> {
        let child = self.command(source).spawn().map_err(|err| {
            warn!("failed to spawn {} for {source}: {err}", self.program);
            CaptureError::Open {
                uri: source.to_string(),
            }
        })?;
        let (tx, rx) = bounded(self.queue_size.max(1));
        // Dropping `capture` kills the child; early returns below rely on it.
        let mut capture = FfmpegCapture {
            child: Some(child),
            frames: rx,
        };
        let stdout = capture
            .child
            .as_mut()
            .and_then(|child| child.stdout.take())
            .ok_or_else(|| CaptureError::Other(anyhow!("failed to capture ffmpeg stdout")))?;

        let target_size = self.target_size;
        thread::Builder::new()
            .name("ffmpeg-relay".into())
            .spawn(move || relay_frames(stdout, target_size, tx))
            .context("failed to spawn ffmpeg relay thread")?;

        debug!("ffmpeg capture started for {source}");
        Ok(Box::new(capture))
    }
}

/// Handle over a running ffmpeg process.
pub struct FfmpegCapture {
    child: Option<Child>,
    frames: Receiver<Result<Frame, CaptureError>>,
}

impl FrameCapture for FfmpegCapture {
    fn read(&mut self, timeout: Duration) -> CaptureRead {
        match self.frames.recv_timeout(timeout) {
            Ok(Ok(frame)) => CaptureRead::Frame(frame),
            Ok(Err(err)) => {
                warn!("ffmpeg capture failed: {err}");
                CaptureRead::Closed
            }
            Err(RecvTimeoutError::Timeout) => CaptureRead::Empty,
            Err(RecvTimeoutError::Disconnected) => CaptureRead::Closed,
        }
    }

    fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        self.close();
    }
}

fn relay_frames(
    mut stdout: ChildStdout,
    target_size: (u32, u32),
    tx: Sender<Result<Frame, CaptureError>>,
) {
    let frame_bytes = FrameFormat::Bgr8.frame_len(target_size.0, target_size.1);
    let mut buffer = vec![0u8; frame_bytes];

    loop {
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                let frame = Frame::bgr8(target_size.0, target_size.1, buffer.clone());
                if tx.send(Ok(frame)).is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = tx.send(Err(CaptureError::Other(err.into())));
                break;
            }
        }
    }
}
