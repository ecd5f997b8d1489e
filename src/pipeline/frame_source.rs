//! Paced capture loop feeding the raw-frame queue

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use super::queue::BoundedDropQueue;
use super::worker::StopSignal;
use crate::capture::{CaptureSource, Frame, FrameTransform};
use crate::error::CaptureError;
use crate::utils::frame_period;

/// Pause after a transient read failure before retrying
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Why the capture loop ended
#[derive(Debug)]
pub enum SourceExit {
    /// Stop was requested
    Stopped { frames: u64 },
    /// The source reported end of stream
    Exhausted { frames: u64 },
    /// Too many consecutive read failures
    Failed { frames: u64, error: CaptureError },
}

impl SourceExit {
    pub fn frames(&self) -> u64 {
        match self {
            SourceExit::Stopped { frames }
            | SourceExit::Exhausted { frames }
            | SourceExit::Failed { frames, .. } => *frames,
        }
    }
}

/// Pulls frames from a capture source at a target rate.
///
/// Every successful read is stamped with the next frame index (starting at 1),
/// preprocessed, and pushed into the output queue, which drops the oldest
/// frame if the consumer falls behind.
pub struct FrameSource {
    source: Box<dyn CaptureSource>,
    output: Arc<BoundedDropQueue<Frame>>,
    period: Duration,
    transform: FrameTransform,
    max_consecutive_errors: u32,
    captured: Arc<AtomicU64>,
}

impl FrameSource {
    pub fn new(
        source: Box<dyn CaptureSource>,
        fps: f64,
        output: Arc<BoundedDropQueue<Frame>>,
    ) -> Self {
        Self {
            source,
            output,
            period: frame_period(fps),
            transform: FrameTransform::default(),
            max_consecutive_errors: 30,
            captured: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_transform(mut self, transform: FrameTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_max_consecutive_errors(mut self, limit: u32) -> Self {
        self.max_consecutive_errors = limit.max(1);
        self
    }

    /// Monotonic count of captured frames, readable from other threads.
    pub fn frame_counter(&self) -> Arc<AtomicU64> {
        self.captured.clone()
    }

    /// Run until stopped, exhausted or failed.
    pub fn run(mut self, stop: &StopSignal) -> SourceExit {
        info!(
            source = self.source.name(),
            period_ms = self.period.as_secs_f64() * 1000.0,
            "frame source running"
        );

        let mut consecutive_errors = 0u32;
        while !stop.is_stopped() {
            let tick = Instant::now();

            match self.capture_one() {
                Ok(frame) => {
                    consecutive_errors = 0;
                    if self.output.push(frame) {
                        debug!("raw frame queue full, dropped oldest frame");
                    }
                }
                Err(CaptureError::Exhausted) => {
                    let frames = self.captured.load(Ordering::Relaxed);
                    info!(frames, "capture source exhausted");
                    return SourceExit::Exhausted { frames };
                }
                Err(error) => {
                    consecutive_errors += 1;
                    metrics::counter!("gesture_capture_errors_total").increment(1);
                    warn!(
                        "Capture error ({}/{}): {}",
                        consecutive_errors, self.max_consecutive_errors, error
                    );
                    if consecutive_errors >= self.max_consecutive_errors {
                        let frames = self.captured.load(Ordering::Relaxed);
                        return SourceExit::Failed { frames, error };
                    }
                    stop.wait_timeout(RETRY_BACKOFF);
                    continue;
                }
            }

            // Free-run when capture is slower than the target rate
            if let Some(remaining) = self.period.checked_sub(tick.elapsed()) {
                stop.wait_timeout(remaining);
            }
        }

        let frames = self.captured.load(Ordering::Relaxed);
        info!(frames, "frame source stopped");
        SourceExit::Stopped { frames }
    }

    #[instrument(level = "trace", skip(self))]
    fn capture_one(&mut self) -> Result<Frame, CaptureError> {
        let frame = self.source.read()?;
        let frame = self.transform.apply(frame)?;

        let sequence = self.captured.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::counter!("gesture_frames_captured_total").increment(1);
        Ok(frame.stamped(sequence))
    }
}
