//! Classifier collaborator: a fixed-size stack of frames in, a class index out

use std::fmt;

use crate::error::ClassifierError;
use crate::pipeline::window::Clip;

/// Result of classifying one clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub class_index: usize,
    pub confidence: Option<f32>,
}

impl Classification {
    pub fn new(class_index: usize) -> Self {
        Self {
            class_index,
            confidence: None,
        }
    }

    /// Argmax over a score vector. NaN scores never win.
    pub fn from_scores(scores: &[f32]) -> Option<Self> {
        scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, s)| !s.is_nan())
            .fold(None, |best: Option<(usize, f32)>, (i, s)| match best {
                Some((_, b)) if b >= s => best,
                _ => Some((i, s)),
            })
            .map(|(class_index, score)| Self {
                class_index,
                confidence: Some(score),
            })
    }
}

/// Anything that turns a clip into a class.
///
/// Owned exclusively by the inference worker; it is never called from more
/// than one thread.
pub trait Classifier: Send {
    fn predict(&mut self, clip: &Clip) -> Result<Classification, ClassifierError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "classifier"
    }
}

impl<F> Classifier for F
where
    F: FnMut(&Clip) -> Result<Classification, ClassifierError> + Send,
{
    fn predict(&mut self, clip: &Clip) -> Result<Classification, ClassifierError> {
        self(clip)
    }
}

/// Input tensor shape a model expects: frames × height × width × channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub frames: usize,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.frames, self.height, self.width, self.channels
        )
    }
}

impl InputShape {
    pub fn check(&self, clip: &Clip) -> Result<(), ClassifierError> {
        if clip.is_empty() {
            return Err(ClassifierError::EmptyClip);
        }

        let mismatch = |actual: String| ClassifierError::InvalidInputShape {
            expected: self.to_string(),
            actual,
        };

        if clip.len() != self.frames {
            return Err(mismatch(format!("{} frames", clip.len())));
        }

        for frame in clip.frames() {
            let channels = frame.channels().unwrap_or(0);
            if frame.width() != self.width
                || frame.height() != self.height
                || channels != self.channels
            {
                return Err(mismatch(
                    InputShape {
                        frames: clip.len(),
                        width: frame.width(),
                        height: frame.height(),
                        channels,
                    }
                    .to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Always answers the same class.
///
/// Stands in for a trained model when running the pipeline dry.
pub struct ConstantClassifier {
    class_index: usize,
    shape: Option<InputShape>,
}

impl ConstantClassifier {
    pub fn new(class_index: usize) -> Self {
        Self {
            class_index,
            shape: None,
        }
    }

    /// Reject clips that do not match `shape`, as a real model would.
    pub fn with_shape(mut self, shape: InputShape) -> Self {
        self.shape = Some(shape);
        self
    }
}

impl Classifier for ConstantClassifier {
    fn predict(&mut self, clip: &Clip) -> Result<Classification, ClassifierError> {
        match &self.shape {
            Some(shape) => shape.check(clip)?,
            None if clip.is_empty() => return Err(ClassifierError::EmptyClip),
            None => {}
        }
        Ok(Classification {
            class_index: self.class_index,
            confidence: Some(1.0),
        })
    }

    fn name(&self) -> &str {
        "constant"
    }
}
