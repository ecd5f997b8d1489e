//! Pipeline orchestration: worker lifecycle, clip cadence and prediction staleness
//!
//! The controller is driven from the caller's thread (typically a render
//! loop). Each call to [`PipelineController::poll`] drains the raw-frame
//! queue, folds frames into the clip window, submits a clip every `cadence`
//! frames and picks up the newest prediction if one is ready. When none is,
//! the previous prediction is kept and its age keeps growing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::frame_source::{FrameSource, SourceExit};
use super::inference::{InferenceCounters, InferenceReport, InferenceWorker, Prediction};
use super::queue::BoundedDropQueue;
use super::window::{Clip, ClipWindow};
use super::worker::Worker;
use crate::capture::{CaptureSource, Frame, FrameTransform};
use crate::classifier::Classifier;
use crate::config::{CaptureConfig, PipelineConfig};
use crate::error::PipelineError;
use crate::labels::LabelTable;
use crate::PipelineStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Latest prediction as seen by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentPrediction {
    pub class_index: usize,
    pub label: Option<Arc<str>>,
    pub confidence: Option<f32>,
    /// Frame index of the newest frame in the classified clip
    pub frame_index: u64,
    /// Frames processed since that frame was captured
    pub age: u64,
}

/// How each execution unit ended
#[derive(Debug)]
pub struct ShutdownReport {
    pub source: Option<SourceExit>,
    pub inference: Option<InferenceReport>,
    pub stats: PipelineStats,
}

/// Capture-side settings applied by the frame source thread
#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub fps: f64,
    pub transform: FrameTransform,
    pub max_consecutive_errors: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            fps: 16.0,
            transform: FrameTransform::default(),
            max_consecutive_errors: 30,
        }
    }
}

impl CaptureSettings {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            fps: config.fps,
            transform: FrameTransform::new(
                config.mirror,
                Some((config.model_width, config.model_height)),
            ),
            max_consecutive_errors: config.max_consecutive_errors,
        }
    }
}

pub struct PipelineController {
    config: PipelineConfig,
    labels: LabelTable,
    state: PipelineState,

    window: ClipWindow,
    raw_frames: Arc<BoundedDropQueue<Frame>>,
    clips: Arc<BoundedDropQueue<Clip>>,
    predictions: Arc<BoundedDropQueue<Prediction>>,

    frame_source: Option<Worker<SourceExit>>,
    inference: Option<Worker<InferenceReport>>,
    captured: Arc<AtomicU64>,
    inference_counters: Arc<InferenceCounters>,

    frames_processed: u64,
    since_last_clip: usize,
    clips_submitted: u64,
    current_frame: u64,
    current: Option<Prediction>,
}

impl PipelineController {
    pub fn new(config: PipelineConfig, labels: LabelTable) -> Result<Self, PipelineError> {
        config.validate()?;

        Ok(Self {
            window: ClipWindow::new(config.clip_length),
            raw_frames: Arc::new(BoundedDropQueue::new(
                "raw_frames",
                config.frame_queue_capacity(),
            )),
            clips: Arc::new(BoundedDropQueue::new("clips", config.queue_capacity)),
            predictions: Arc::new(BoundedDropQueue::new("predictions", 1)),
            frame_source: None,
            inference: None,
            captured: Arc::new(AtomicU64::new(0)),
            inference_counters: Arc::new(InferenceCounters::default()),
            frames_processed: 0,
            since_last_clip: 0,
            clips_submitted: 0,
            current_frame: 0,
            current: None,
            state: PipelineState::Idle,
            config,
            labels,
        })
    }

    /// Spawn the frame source and inference threads.
    pub fn start(
        &mut self,
        source: Box<dyn CaptureSource>,
        classifier: Box<dyn Classifier>,
        capture: CaptureSettings,
    ) -> Result<(), PipelineError> {
        self.expect_state("start", &[PipelineState::Idle])?;

        let frame_source = FrameSource::new(source, capture.fps, self.raw_frames.clone())
            .with_transform(capture.transform)
            .with_max_consecutive_errors(capture.max_consecutive_errors);
        self.captured = frame_source.frame_counter();

        let inference = InferenceWorker::new(
            classifier,
            self.clips.clone(),
            self.predictions.clone(),
            self.config.inference_timeout(),
        );
        self.inference_counters = inference.counters();

        self.inference = Some(Worker::start("inference", move |stop| {
            inference.run(&stop)
        })?);
        match Worker::start("frame-source", move |stop| frame_source.run(&stop)) {
            Ok(worker) => self.frame_source = Some(worker),
            Err(e) => {
                if let Some(inference) = self.inference.take() {
                    inference.stop();
                    let _ = inference.join(self.config.shutdown_timeout());
                }
                return Err(e);
            }
        }

        self.state = PipelineState::Running;
        info!(
            clip_length = self.config.clip_length,
            cadence = self.config.cadence,
            queue_capacity = self.config.queue_capacity,
            "pipeline running"
        );
        Ok(())
    }

    /// Drain captured frames and refresh the current prediction.
    ///
    /// Meant to be called once per display tick.
    pub fn poll(&mut self) -> Result<Option<CurrentPrediction>, PipelineError> {
        self.expect_state("poll", &[PipelineState::Idle, PipelineState::Running])?;

        // Bounded so a free-running producer cannot hold up the caller's tick
        for _ in 0..self.raw_frames.capacity() {
            let Some(frame) = self.raw_frames.try_pop() else {
                break;
            };
            self.process_frame(frame);
        }
        self.refresh_prediction();
        Ok(self.current_prediction())
    }

    /// Process one frame supplied directly by the caller.
    pub fn ingest(&mut self, frame: Frame) -> Result<(), PipelineError> {
        self.expect_state("ingest", &[PipelineState::Idle, PipelineState::Running])?;
        self.process_frame(frame);
        Ok(())
    }

    fn process_frame(&mut self, frame: Frame) {
        // Frames from the caller's own capture loop arrive unsequenced
        let frame = if frame.sequence() == 0 {
            frame.stamped(self.current_frame + 1)
        } else {
            frame
        };
        self.current_frame = self.current_frame.max(frame.sequence());
        self.window.push(frame);
        self.frames_processed += 1;
        self.since_last_clip += 1;

        if self.since_last_clip >= self.config.cadence {
            self.since_last_clip = 0;
            self.submit_clip();
        }

        self.refresh_prediction();
    }

    fn submit_clip(&mut self) {
        let Some(clip) = self.window.snapshot() else {
            return;
        };

        debug!(
            frame_index = clip.last_sequence(),
            padded = clip.padded(),
            "submitting clip"
        );
        self.clips_submitted += 1;
        metrics::counter!("gesture_clips_submitted_total").increment(1);
        if self.clips.push(clip) {
            debug!("inference is behind, dropped oldest pending clip");
        }
    }

    fn refresh_prediction(&mut self) {
        if let Some(prediction) = self.predictions.try_pop() {
            self.current = Some(prediction);
        }
        if let Some(current) = &self.current {
            let age = self.current_frame.saturating_sub(current.frame_index);
            metrics::gauge!("gesture_prediction_age_frames").set(age as f64);
        }
    }

    /// Latest known prediction and its age in frames.
    ///
    /// `None` only until the first inference completes.
    pub fn current_prediction(&self) -> Option<CurrentPrediction> {
        self.current.as_ref().map(|p| CurrentPrediction {
            class_index: p.class_index,
            label: self.labels.name(p.class_index).cloned(),
            confidence: p.confidence,
            frame_index: p.frame_index,
            age: self.current_frame.saturating_sub(p.frame_index),
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether the frame source thread has ended (exhausted, failed or stopped).
    pub fn source_finished(&self) -> bool {
        self.frame_source.as_ref().map_or(true, Worker::is_finished)
    }

    /// Clips submitted but neither dropped nor finished by inference.
    pub fn pending_clips(&self) -> u64 {
        let dropped = self.clips.counters().dropped;
        self.clips_submitted
            .saturating_sub(dropped)
            .saturating_sub(self.inference_counters.finished())
    }

    /// Nothing left to do: capture ended, every frame and clip handled.
    pub fn is_idle(&self) -> bool {
        self.source_finished() && self.raw_frames.is_empty() && self.pending_clips() == 0
    }

    pub fn stats(&self) -> PipelineStats {
        let raw = self.raw_frames.counters();
        let clips = self.clips.counters();
        let predictions = self.predictions.counters();
        PipelineStats {
            frames_captured: self.captured.load(Ordering::Relaxed),
            frames_processed: self.frames_processed,
            frames_dropped: raw.dropped,
            clips_submitted: self.clips_submitted,
            clips_dropped: clips.dropped,
            predictions_completed: self.inference_counters.completed(),
            predictions_dropped: predictions.dropped,
            inference_failures: self.inference_counters.failed(),
            prediction_age: self.current_prediction().map(|p| p.age),
        }
    }

    /// Signal both workers, join them and move to `Stopped`.
    ///
    /// Both workers share one shutdown deadline. A worker still running when it
    /// passes is abandoned and reported as [`PipelineError::JoinTimeout`].
    pub fn stop(&mut self) -> Result<ShutdownReport, PipelineError> {
        self.expect_state("stop", &[PipelineState::Idle, PipelineState::Running])?;
        self.state = PipelineState::Stopping;
        info!("pipeline stopping");

        let deadline = Instant::now() + self.config.shutdown_timeout();
        let frame_source = self.frame_source.take();
        let inference = self.inference.take();
        if let Some(w) = &frame_source {
            w.stop();
        }
        if let Some(w) = &inference {
            w.stop();
        }

        let (source, source_err) = join_worker(frame_source, deadline);
        let (inference, inference_err) = join_worker(inference, deadline);

        self.state = PipelineState::Stopped;
        let stats = self.stats();
        info!(?stats, "pipeline stopped");

        if let Some(e) = source_err.or(inference_err) {
            error!("Pipeline shutdown failed: {}", e);
            return Err(e);
        }

        Ok(ShutdownReport {
            source,
            inference,
            stats,
        })
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[PipelineState],
    ) -> Result<(), PipelineError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(PipelineError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

fn join_worker<R: Send + 'static>(
    worker: Option<Worker<R>>,
    deadline: Instant,
) -> (Option<R>, Option<PipelineError>) {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match worker.map(|w| w.join(remaining)) {
        None => (None, None),
        Some(Ok(r)) => (Some(r), None),
        Some(Err(e)) => (None, Some(e)),
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if self.frame_source.is_some() || self.inference.is_some() {
            warn!("pipeline dropped while running, signalling workers to stop");
        }
        if let Some(w) = &self.frame_source {
            w.stop();
        }
        if let Some(w) = &self.inference {
            w.stop();
        }
    }
}
