//! Pipeline configuration: defaults, optional TOML file, `GESTURE_` environment overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::frame::PixelFormat;
use crate::classifier::InputShape;
use crate::error::PipelineError;
use crate::labels::{LabelTable, DEFAULT_GESTURES};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub classifier: ClassifierConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Synthetic,
    ImageDir,
    V4l2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: SourceKind,
    /// V4L2 device path, empty to auto-detect
    pub device: String,
    pub format: PixelFormat,
    pub buffer_count: u32,
    /// Directory of recorded frames for `image_dir`
    pub directory: Option<PathBuf>,
    pub looping: bool,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub mirror: bool,
    /// Frames are resized to this size before entering the pipeline
    pub model_width: u32,
    pub model_height: u32,
    pub max_consecutive_errors: u32,
    /// Frame limit for the synthetic source
    pub synthetic_frames: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames per clip (N)
    pub clip_length: usize,
    /// Frames between clip submissions (K)
    pub cadence: usize,
    /// Capacity of the clip queue feeding inference (C)
    pub queue_capacity: usize,
    /// Capacity of the raw frame queue, defaults to `clip_length`
    pub frame_queue_capacity: Option<usize>,
    pub inference_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub labels: Vec<String>,
    /// Class answered by the dry-run classifier
    pub constant_class: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Rate at which the caller polls for predictions
    pub fps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Synthetic,
            device: "/dev/video0".into(),
            format: PixelFormat::Mjpeg,
            buffer_count: 4,
            directory: None,
            looping: false,
            width: 640,
            height: 480,
            fps: 16.0,
            mirror: true,
            model_width: 100,
            model_height: 100,
            max_consecutive_errors: 30,
            synthetic_frames: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clip_length: 20,
            cadence: 16,
            queue_capacity: 4,
            frame_queue_capacity: None,
            inference_timeout_ms: 100,
            shutdown_timeout_ms: 2_000,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            labels: DEFAULT_GESTURES.iter().map(|s| s.to_string()).collect(),
            constant_class: 0,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { fps: 30.0 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "gesture_stream=info".into(),
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `GESTURE_*` environment variables.
    ///
    /// Nested keys use `__`, e.g. `GESTURE_PIPELINE__CADENCE=8`.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("GESTURE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.pipeline.validate()?;
        self.capture.validate()?;
        if !(self.display.fps.is_finite() && self.display.fps > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "display.fps must be positive, got {}",
                self.display.fps
            )));
        }
        Ok(())
    }

    pub fn labels(&self) -> LabelTable {
        LabelTable::new(&self.classifier.labels)
    }

    /// Shape the pipeline hands to the classifier.
    pub fn input_shape(&self) -> InputShape {
        InputShape {
            frames: self.pipeline.clip_length,
            width: self.capture.model_width,
            height: self.capture.model_height,
            channels: 3,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "capture.fps must be positive, got {}",
                self.fps
            )));
        }
        if self.model_width == 0 || self.model_height == 0 {
            return Err(PipelineError::InvalidConfig(
                "capture.model_width and model_height must be non-zero".into(),
            ));
        }
        if self.source == SourceKind::ImageDir && self.directory.is_none() {
            return Err(PipelineError::InvalidConfig(
                "capture.directory is required for the image_dir source".into(),
            ));
        }
        Ok(())
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if self.clip_length == 0 {
            return invalid("pipeline.clip_length must be at least 1".into());
        }
        if self.cadence == 0 || self.cadence > self.clip_length {
            return invalid(format!(
                "pipeline.cadence must be within 1..={}, got {}",
                self.clip_length, self.cadence
            ));
        }
        if self.queue_capacity == 0 {
            return invalid("pipeline.queue_capacity must be at least 1".into());
        }
        if self.frame_queue_capacity == Some(0) {
            return invalid("pipeline.frame_queue_capacity must be at least 1".into());
        }
        if self.inference_timeout_ms == 0 || self.shutdown_timeout_ms == 0 {
            return invalid("pipeline timeouts must be non-zero".into());
        }
        Ok(())
    }

    pub fn frame_queue_capacity(&self) -> usize {
        self.frame_queue_capacity.unwrap_or(self.clip_length)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.pipeline.frame_queue_capacity(), 20);
        assert_eq!(config.labels().len(), 8);
        assert_eq!(config.input_shape().frames, 20);
    }

    #[test]
    fn rejects_bad_cadence_and_capacity() {
        let mut pipeline = PipelineConfig::default();
        pipeline.cadence = 0;
        assert!(pipeline.validate().is_err());

        pipeline.cadence = 21;
        assert!(pipeline.validate().is_err());

        pipeline.cadence = 20;
        assert!(pipeline.validate().is_ok());

        pipeline.queue_capacity = 0;
        assert!(matches!(
            pipeline.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn image_dir_requires_directory() {
        let capture = CaptureConfig {
            source: SourceKind::ImageDir,
            ..CaptureConfig::default()
        };
        assert!(capture.validate().is_err());
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[pipeline]
clip_length = 8
cadence = 4

[capture]
source = "image_dir"
directory = "/tmp/frames"
fps = 24.0

[classifier]
labels = ["fist", "palm"]
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.pipeline.clip_length, 8);
        assert_eq!(config.pipeline.cadence, 4);
        assert_eq!(config.pipeline.queue_capacity, 4);
        assert_eq!(config.capture.source, SourceKind::ImageDir);
        assert_eq!(config.capture.fps, 24.0);
        assert_eq!(config.capture.model_width, 100);
        assert_eq!(config.labels().index_of("palm"), Some(1));
    }

    #[test]
    fn invalid_file_values_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[pipeline]\ncadence = 40").unwrap();

        assert!(matches!(
            Config::load(Some(file.path())),
            Err(PipelineError::InvalidConfig(_))
        ));
    }
}
