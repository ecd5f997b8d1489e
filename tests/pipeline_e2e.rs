//! End-to-end tests: real frame source and inference threads driven by a poll loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gesture_stream::capture::SyntheticSource;
use gesture_stream::config::PipelineConfig;
use gesture_stream::pipeline::SourceExit;
use gesture_stream::{
    CaptureSettings, Classification, ClassifierError, Clip, ConstantClassifier, LabelTable,
    PipelineController,
};
use parking_lot::Mutex;

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("gesture_stream=debug")
        .with_test_writer()
        .try_init();
}

fn pipeline_config(clip_length: usize, cadence: usize, queue_capacity: usize) -> PipelineConfig {
    PipelineConfig {
        clip_length,
        cadence,
        queue_capacity,
        // Roomy raw queue so a slow test machine never drops frames
        frame_queue_capacity: Some(64),
        inference_timeout_ms: 20,
        shutdown_timeout_ms: 2_000,
    }
}

fn settings(fps: f64) -> CaptureSettings {
    CaptureSettings {
        fps,
        ..CaptureSettings::default()
    }
}

/// Poll like a render loop until `done` holds, failing after `limit`.
fn poll_until(
    controller: &mut PipelineController,
    limit: Duration,
    mut done: impl FnMut(&PipelineController) -> bool,
) {
    let deadline = Instant::now() + limit;
    loop {
        controller.poll().unwrap();
        if done(controller) {
            return;
        }
        assert!(Instant::now() < deadline, "pipeline did not settle in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn sixty_four_frames_yield_four_full_clips() {
    init_test_tracing();

    let seen: Arc<Mutex<Vec<Vec<u64>>>> = Arc::default();
    let recorder = {
        let seen = seen.clone();
        move |clip: &Clip| -> Result<Classification, ClassifierError> {
            seen.lock().push(clip.sequences());
            Ok(Classification::new(0))
        }
    };

    let mut controller =
        PipelineController::new(pipeline_config(20, 16, 4), LabelTable::default()).unwrap();
    controller
        .start(
            Box::new(SyntheticSource::new(8, 8).with_limit(64)),
            Box::new(recorder),
            settings(16.0),
        )
        .unwrap();

    poll_until(&mut controller, Duration::from_secs(15), |c| c.is_idle());
    let report = controller.stop().unwrap();

    assert!(matches!(report.source, Some(SourceExit::Exhausted { frames: 64 })));
    assert_eq!(report.stats.frames_dropped, 0);
    assert_eq!(report.stats.frames_processed, 64);
    assert_eq!(report.stats.clips_submitted, 4);
    assert_eq!(report.stats.clips_dropped, 0);

    let clips = seen.lock().clone();
    assert_eq!(clips.len(), 4);
    for (j, clip) in clips.iter().enumerate() {
        assert_eq!(clip.len(), 20);
        let end = 16 * (j as u64 + 1);
        let expected: Vec<u64> = if end < 20 {
            // Window not yet full: padded with the oldest frame
            std::iter::repeat(1)
                .take(20 - end as usize)
                .chain(1..=end)
                .collect()
        } else {
            (end - 19..=end).collect()
        };
        assert_eq!(clip, &expected, "clip {}", j + 1);
    }
}

#[test]
fn constant_classifier_surfaces_its_class() {
    init_test_tracing();

    let mut controller =
        PipelineController::new(pipeline_config(20, 16, 4), LabelTable::default()).unwrap();
    controller
        .start(
            Box::new(SyntheticSource::new(8, 8)),
            Box::new(ConstantClassifier::new(3)),
            settings(200.0),
        )
        .unwrap();

    poll_until(&mut controller, Duration::from_secs(10), |c| {
        c.current_prediction().is_some()
    });

    let current = controller.current_prediction().unwrap();
    assert_eq!(current.class_index, 3);
    assert_eq!(current.label.as_deref(), Some("swipe_left"));
    assert!(current.frame_index >= 16);

    let report = controller.stop().unwrap();
    assert!(matches!(report.source, Some(SourceExit::Stopped { .. })));
    assert!(report.inference.unwrap().completed >= 1);
}

#[test]
fn age_grows_while_inference_is_blocked() {
    init_test_tracing();

    let (release_tx, release_rx) = flume::bounded::<()>(1);
    let mut calls = 0u32;
    let blocks_after_first = move |_: &Clip| -> Result<Classification, ClassifierError> {
        calls += 1;
        if calls > 1 {
            let _ = release_rx.recv();
        }
        Ok(Classification::new(1))
    };

    let mut controller =
        PipelineController::new(pipeline_config(8, 4, 2), LabelTable::default()).unwrap();
    controller
        .start(
            Box::new(SyntheticSource::new(4, 4)),
            Box::new(blocks_after_first),
            settings(200.0),
        )
        .unwrap();

    poll_until(&mut controller, Duration::from_secs(10), |c| {
        c.current_prediction().is_some()
    });

    let first = controller.current_prediction().unwrap();
    let mut last_age = first.age;
    let mut last_processed = controller.stats().frames_processed;
    let mut grew = 0;
    for _ in 0..30 {
        thread::sleep(Duration::from_millis(15));
        let current = controller.poll().unwrap().unwrap();
        let processed = controller.stats().frames_processed;

        assert_eq!(current.frame_index, first.frame_index, "prediction was replaced");
        if processed > last_processed {
            assert!(current.age > last_age, "age must grow with every new frame");
            grew += 1;
        } else {
            assert_eq!(current.age, last_age);
        }
        last_age = current.age;
        last_processed = processed;
    }
    assert!(grew > 0);
    assert!(controller.stats().clips_dropped > 0);

    drop(release_tx);
    controller.stop().unwrap();
}

#[test]
fn inference_drains_after_source_is_exhausted() {
    init_test_tracing();

    let slow = |_: &Clip| -> Result<Classification, ClassifierError> {
        thread::sleep(Duration::from_millis(40));
        Ok(Classification::new(7))
    };

    let mut controller =
        PipelineController::new(pipeline_config(8, 4, 8), LabelTable::default()).unwrap();
    controller
        .start(
            Box::new(SyntheticSource::new(4, 4).with_limit(24)),
            Box::new(slow),
            settings(500.0),
        )
        .unwrap();

    poll_until(&mut controller, Duration::from_secs(10), |c| c.source_finished());
    let at_exhaustion = controller.stats().predictions_completed;

    poll_until(&mut controller, Duration::from_secs(10), |c| c.is_idle());
    controller.poll().unwrap();

    let current = controller.current_prediction().unwrap();
    assert_eq!(current.label.as_deref(), Some("wave"));

    let report = controller.stop().unwrap();
    assert!(matches!(report.source, Some(SourceExit::Exhausted { frames: 24 })));
    assert_eq!(report.stats.clips_submitted, 6);
    assert!(report.stats.predictions_completed > at_exhaustion);
    assert_eq!(
        report.stats.predictions_completed,
        report.stats.clips_submitted - report.stats.clips_dropped
    );
}

#[test]
fn failing_classifier_keeps_pipeline_alive() {
    init_test_tracing();

    let mut calls = 0u32;
    let flaky = move |_: &Clip| -> Result<Classification, ClassifierError> {
        calls += 1;
        if calls % 2 == 1 {
            Err(ClassifierError::Backend("model hiccup".into()))
        } else {
            Ok(Classification::new(2))
        }
    };

    let mut controller =
        PipelineController::new(pipeline_config(4, 2, 8), LabelTable::default()).unwrap();
    controller
        .start(
            Box::new(SyntheticSource::new(2, 2).with_limit(16)),
            Box::new(flaky),
            settings(500.0),
        )
        .unwrap();

    poll_until(&mut controller, Duration::from_secs(10), |c| c.is_idle());
    controller.poll().unwrap();

    let stats = controller.stats();
    assert_eq!(stats.inference_failures + stats.predictions_completed, 8 - stats.clips_dropped);
    assert!(stats.inference_failures >= 1);
    assert_eq!(controller.current_prediction().unwrap().class_index, 2);

    controller.stop().unwrap();
}
