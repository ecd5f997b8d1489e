//! Inference loop: ready clips in, newest prediction out

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::utils::CachePadded;
use tracing::{debug, info, instrument, warn};

use super::queue::BoundedDropQueue;
use super::window::Clip;
use super::worker::StopSignal;
use crate::classifier::Classifier;

/// Classifier output tagged with the frame it describes
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub confidence: Option<f32>,
    /// Index of the newest frame in the classified clip
    pub frame_index: u64,
    /// Time spent inside the classifier
    pub latency: Duration,
}

/// Counters shared between the worker thread and the controller
#[derive(Debug, Default)]
pub struct InferenceCounters {
    completed: CachePadded<AtomicU64>,
    failed: CachePadded<AtomicU64>,
}

impl InferenceCounters {
    /// Clips fully handled, successfully or not.
    pub fn finished(&self) -> u64 {
        self.completed() + self.failed()
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Summary returned when the worker exits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InferenceReport {
    pub completed: u64,
    pub failed: u64,
}

pub struct InferenceWorker {
    classifier: Box<dyn Classifier>,
    input: Arc<BoundedDropQueue<Clip>>,
    output: Arc<BoundedDropQueue<Prediction>>,
    poll_timeout: Duration,
    counters: Arc<InferenceCounters>,
}

impl InferenceWorker {
    pub fn new(
        classifier: Box<dyn Classifier>,
        input: Arc<BoundedDropQueue<Clip>>,
        output: Arc<BoundedDropQueue<Prediction>>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            input,
            output,
            poll_timeout,
            counters: Arc::new(InferenceCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<InferenceCounters> {
        self.counters.clone()
    }

    /// Run until stopped. The stop flag is checked at least once per poll timeout.
    pub fn run(mut self, stop: &StopSignal) -> InferenceReport {
        info!(
            classifier = self.classifier.name(),
            timeout_ms = self.poll_timeout.as_millis() as u64,
            "inference worker running"
        );

        while !stop.is_stopped() {
            let Some(clip) = self.input.blocking_pop(self.poll_timeout) else {
                continue;
            };
            self.process(&clip);
        }

        let report = InferenceReport {
            completed: self.counters.completed(),
            failed: self.counters.failed(),
        };
        info!(
            completed = report.completed,
            failed = report.failed,
            "inference worker stopped"
        );
        report
    }

    #[instrument(level = "debug", skip_all, fields(frame_index = clip.last_sequence()))]
    fn process(&mut self, clip: &Clip) {
        let frame_index = clip.last_sequence().unwrap_or_default();
        let started = Instant::now();
        let result = self.classifier.predict(clip);
        let latency = started.elapsed();
        metrics::histogram!("gesture_inference_duration_seconds").record(latency.as_secs_f64());

        match result {
            Ok(classification) => {
                let prediction = Prediction {
                    class_index: classification.class_index,
                    confidence: classification.confidence,
                    frame_index,
                    latency,
                };
                debug!(
                    class = prediction.class_index,
                    latency_ms = latency.as_secs_f64() * 1000.0,
                    "clip classified"
                );
                if self.output.push(prediction) {
                    debug!("unused prediction replaced by a newer one");
                }
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("gesture_inference_failures_total").increment(1);
                warn!("Skipping clip ending at frame {}: {}", frame_index, e);
            }
        }
    }
}
