//! Real-time gesture recognition over live or recorded video.
//!
//! A frame source thread captures frames at a paced rate, the caller's thread
//! folds them into a sliding clip window, and an inference thread classifies a
//! clip every `cadence` frames. Stages talk only through bounded queues that
//! drop their oldest item instead of blocking.

pub mod capture;
pub mod classifier;
pub mod config;
pub mod error;
pub mod labels;
pub mod pipeline;
pub mod utils;

pub use capture::{CaptureSource, Frame, FrameTransform, PixelFormat};
pub use classifier::{Classification, Classifier, ConstantClassifier, InputShape};
pub use config::Config;
pub use error::{CaptureError, ClassifierError, PipelineError};
pub use labels::LabelTable;
pub use pipeline::{CaptureSettings, Clip, CurrentPrediction, PipelineController, PipelineState};

/// Counters collected throughout the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_captured: u64,
    pub frames_processed: u64,
    /// Raw frames evicted because the controller fell behind capture
    pub frames_dropped: u64,
    pub clips_submitted: u64,
    /// Clips evicted because inference fell behind
    pub clips_dropped: u64,
    pub predictions_completed: u64,
    /// Predictions replaced before the controller picked them up
    pub predictions_dropped: u64,
    pub inference_failures: u64,
    pub prediction_age: Option<u64>,
}
