use std::fmt;

use anyhow::Error;
use chrono::Utc;
use thiserror::Error;

/// Raw frame captured from a video source.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

impl Frame {
    /// Wrap a packed BGR24 buffer stamped with the current wall-clock time.
    pub fn bgr8(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        }
    }

    /// Black BGR24 frame of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::bgr8(
            width,
            height,
            vec![0; FrameFormat::Bgr8.frame_len(width, height)],
        )
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }

    pub fn frame_len(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

/// Where frames come from: a local capture device or a network/file stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceDescriptor {
    Device { index: u32 },
    Rtsp { url: String },
    Stream { uri: String },
}

impl SourceDescriptor {
    /// Classify a source string: `0` or `/dev/video0` is a device, `rtsp(s)://` is RTSP,
    /// anything else (udp, http, file path) is handed to the decoder as-is.
    pub fn parse(uri: &str) -> Result<Self, CaptureError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(CaptureError::InvalidDescriptor(uri.to_string()));
        }
        if let Some(index) = parse_device_index(uri) {
            return Ok(SourceDescriptor::Device { index });
        }
        if uri.starts_with("rtsp://") || uri.starts_with("rtsps://") {
            return Ok(SourceDescriptor::Rtsp {
                url: uri.to_string(),
            });
        }
        Ok(SourceDescriptor::Stream {
            uri: uri.to_string(),
        })
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Device { index } => write!(f, "/dev/video{index}"),
            SourceDescriptor::Rtsp { url } => f.write_str(url),
            SourceDescriptor::Stream { uri } => f.write_str(uri),
        }
    }
}

/// Parse a `/dev/videoX` style URI (or a bare index) into the device index.
fn parse_device_index(uri: &str) -> Option<u32> {
    if let Ok(index) = uri.parse::<u32>() {
        return Some(index);
    }
    let stripped = uri.strip_prefix("/dev/video")?;
    if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
        return stripped.parse::<u32>().ok();
    }
    None
}

/// Failure to reach or keep reading a video source.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("invalid source descriptor {0:?}")]
    InvalidDescriptor(String),
    #[error(transparent)]
    Other(#[from] Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_sources() {
        assert_eq!(
            SourceDescriptor::parse("0").unwrap(),
            SourceDescriptor::Device { index: 0 }
        );
        assert_eq!(
            SourceDescriptor::parse("/dev/video2").unwrap(),
            SourceDescriptor::Device { index: 2 }
        );
        assert!(matches!(
            SourceDescriptor::parse("rtsp://localhost:8554/stream").unwrap(),
            SourceDescriptor::Rtsp { .. }
        ));
        assert!(matches!(
            SourceDescriptor::parse("/dev/videox").unwrap(),
            SourceDescriptor::Stream { .. }
        ));
        assert!(matches!(
            SourceDescriptor::parse("  "),
            Err(CaptureError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn blank_frame_has_packed_bgr_length() {
        let frame = Frame::blank(4, 3);
        assert_eq!(frame.data.len(), 36);
        assert_eq!(frame.format, FrameFormat::Bgr8);
    }
}
