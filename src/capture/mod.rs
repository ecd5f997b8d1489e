pub mod decoder;
pub mod frame;
pub mod image_dir;
pub mod source;
pub mod transform;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use frame::Frame;
pub use frame::PixelFormat;
pub use image_dir::ImageSequenceSource;
pub use source::{CaptureSource, SyntheticSource};
pub use transform::FrameTransform;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Source;
