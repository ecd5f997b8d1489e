pub mod controller;
pub mod frame_source;
pub mod inference;
pub mod queue;
pub mod window;
pub mod worker;

pub use controller::{
    CaptureSettings, CurrentPrediction, PipelineController, PipelineState, ShutdownReport,
};
pub use frame_source::{FrameSource, SourceExit};
pub use inference::{InferenceReport, InferenceWorker, Prediction};
pub use queue::{BoundedDropQueue, QueueCounters};
pub use window::{Clip, ClipWindow};
pub use worker::{StopSignal, Worker};
