//! Capture collaborator interface and a synthetic source for dry runs

use bytes::Bytes;

use super::frame::{Frame, PixelFormat};
use crate::error::CaptureError;

/// Anything that yields frames on demand.
///
/// `read` blocks until a frame is available. Returning
/// [`CaptureError::Exhausted`] ends the stream; any other error is transient.
pub trait CaptureSource: Send {
    fn read(&mut self) -> Result<Frame, CaptureError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "capture"
    }
}

impl<F> CaptureSource for F
where
    F: FnMut() -> Result<Frame, CaptureError> + Send,
{
    fn read(&mut self) -> Result<Frame, CaptureError> {
        self()
    }
}

/// Generates deterministic RGB24 frames.
///
/// Every byte of frame `i` (0-based) is `i % 256`, which makes frames easy
/// to tell apart in tests.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    limit: Option<u64>,
    produced: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            limit: None,
            produced: 0,
        }
    }

    /// Stop after `frames` frames with [`CaptureError::Exhausted`].
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }
}

impl CaptureSource for SyntheticSource {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Err(CaptureError::Exhausted);
        }

        let len = (self.width as usize) * (self.height as usize) * 3;
        let value = (self.produced % 256) as u8;
        self.produced += 1;

        Ok(Frame::new(
            self.width,
            self.height,
            PixelFormat::Rgb24,
            Bytes::from(vec![value; len]),
        ))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
