//! Error taxonomy for capture, classification and pipeline lifecycle

use std::time::Duration;

use thiserror::Error;

use crate::capture::frame::PixelFormat;
use crate::pipeline::controller::PipelineState;

/// Errors raised by a capture source.
///
/// `Exhausted` is terminal for the frame source; every other variant is
/// treated as a transient read failure and retried.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture source exhausted")]
    Exhausted,
    #[error("capture device error: {0}")]
    Device(String),
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("unsupported pixel format: {0:?}")]
    UnsupportedFormat(PixelFormat),
    #[error("frame transform failed: {0}")]
    Transform(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, CaptureError::Exhausted)
    }
}

/// Errors raised by a classifier for a single clip.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("clip is empty")]
    EmptyClip,
    #[error("classifier backend error: {0}")]
    Backend(String),
}

/// Errors raised by the pipeline controller and its workers.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("cannot {operation} while pipeline is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },
    #[error("failed to spawn {worker} thread: {source}")]
    Spawn {
        worker: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{worker} did not stop within {timeout:?}; abandoning thread")]
    JoinTimeout { worker: String, timeout: Duration },
    #[error("{worker} thread panicked")]
    WorkerPanicked { worker: String },
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
