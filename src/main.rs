//! Gesture stream: live gesture recognition with threaded capture and inference

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gesture_stream::capture::{CaptureSource, ImageSequenceSource, SyntheticSource};
use gesture_stream::config::{Config, SourceKind};
use gesture_stream::utils::frame_period;
use gesture_stream::{CaptureSettings, ConstantClassifier, PipelineController};

fn main() -> Result<()> {
    color_eyre::install()?;

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("GESTURE_CONFIG").map(PathBuf::from));
    let config = Config::load(config_path.as_deref())?;

    init_tracing(&config.logging.filter);
    info!("Gesture stream launching...");
    if let Some(path) = &config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        if let Err(err) = ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst)) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    }

    let source = open_source(&config)?;
    let classifier = ConstantClassifier::new(config.classifier.constant_class)
        .with_shape(config.input_shape());

    let mut controller = PipelineController::new(config.pipeline.clone(), config.labels())?;
    controller.start(
        source,
        Box::new(classifier),
        CaptureSettings::from_config(&config.capture),
    )?;

    let tick = frame_period(config.display.fps);
    let mut shown: Option<usize> = None;
    while !shutdown.load(Ordering::SeqCst) {
        let started = Instant::now();

        if let Some(current) = controller.poll()? {
            if shown != Some(current.class_index) {
                info!(
                    label = current.label.as_deref().unwrap_or("<unknown>"),
                    class = current.class_index,
                    age = current.age,
                    confidence = current.confidence,
                    "Prediction"
                );
                shown = Some(current.class_index);
            }
        }

        if controller.is_idle() {
            info!("Capture finished and all clips processed");
            break;
        }

        if let Some(remaining) = tick.checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }

    let report = controller.stop()?;
    info!(
        "Source: {:?}, inference: {:?}",
        report.source, report.inference
    );
    info!("Final stats: {:?}", report.stats);
    info!("Gesture stream shutting down");
    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer().with_timer(tracing_subscriber::fmt::time::uptime()),
    );

    #[cfg(feature = "profiling")]
    let registry = registry.with(tracing_tracy::TracyLayer::default());

    registry.init();
}

fn open_source(config: &Config) -> Result<Box<dyn CaptureSource>> {
    let capture = &config.capture;
    match capture.source {
        SourceKind::Synthetic => {
            let mut source = SyntheticSource::new(capture.width, capture.height);
            if let Some(limit) = capture.synthetic_frames {
                source = source.with_limit(limit);
            }
            Ok(Box::new(source))
        }
        SourceKind::ImageDir => {
            let dir = capture
                .directory
                .as_ref()
                .ok_or_else(|| eyre!("capture.directory is not set"))?;
            Ok(Box::new(ImageSequenceSource::open(dir, capture.looping)?))
        }
        #[cfg(feature = "v4l2")]
        SourceKind::V4l2 => {
            let mut capture = capture.clone();
            if capture.device.is_empty() {
                let (path, format) = gesture_stream::utils::auto_detect_device()
                    .ok_or_else(|| eyre!("No suitable capture device found"))?;
                capture.device = path;
                capture.format = format;
            }
            info!("Using capture device: {}", capture.device);
            Ok(Box::new(gesture_stream::capture::V4l2Source::open(&capture)?))
        }
        #[cfg(not(feature = "v4l2"))]
        SourceKind::V4l2 => Err(eyre!(
            "V4L2 capture requested but the `v4l2` feature is not enabled"
        )),
    }
}
