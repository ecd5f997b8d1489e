use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Captured frame.
///
/// Pixel data is immutable once built: cloning a frame shares the buffer but no
/// thread can mutate it, so every holder effectively owns its own copy.
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Pipeline-relative frame index, assigned by the frame source (starts at 1)
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Gray8,
    Yuyv4,
    Mjpeg,
}

impl PixelFormat {
    /// Interleaved channel count, `None` for compressed or packed formats.
    pub fn channels(self) -> Option<u8> {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => Some(3),
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Yuyv4 | PixelFormat::Mjpeg => None,
        }
    }
}

impl Frame {
    /// Build an unsequenced frame stamped with the current instant.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            meta: Arc::new(FrameMetadata {
                sequence: 0,
                width,
                height,
                format,
                device_timestamp: None,
            }),
            timestamp: Instant::now(),
        }
    }

    pub fn with_device_timestamp(mut self, ts: Duration) -> Self {
        Arc::make_mut(&mut self.meta).device_timestamp = Some(ts);
        self
    }

    /// Assign the pipeline frame index.
    pub fn stamped(mut self, sequence: u64) -> Self {
        Arc::make_mut(&mut self.meta).sequence = sequence;
        self
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn format(&self) -> PixelFormat {
        self.meta.format
    }

    pub fn channels(&self) -> Option<u8> {
        self.meta.format.channels()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.meta.sequence)
            .field("width", &self.meta.width)
            .field("height", &self.meta.height)
            .field("format", &self.meta.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}
