//! Capture-side preprocessing: selfie mirror and resize to the model input size

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Rgb};

use super::decoder;
use super::frame::{Frame, PixelFormat};
use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameTransform {
    /// Flip horizontally so the preview behaves like a mirror
    pub mirror: bool,
    /// Target (width, height); `None` keeps the capture size
    pub resize: Option<(u32, u32)>,
}

impl FrameTransform {
    pub fn new(mirror: bool, resize: Option<(u32, u32)>) -> Self {
        Self { mirror, resize }
    }

    pub fn is_identity(&self) -> bool {
        !self.mirror && self.resize.is_none()
    }

    /// Apply the transform, preserving sequence and timestamps.
    ///
    /// Packed and compressed formats are decoded to RGB24 first.
    pub fn apply(&self, frame: Frame) -> Result<Frame, CaptureError> {
        if self.is_identity() {
            return Ok(frame);
        }

        let frame = match frame.format() {
            PixelFormat::Rgb24 | PixelFormat::Gray8 => frame,
            _ => decoder::to_rgb(&frame)?,
        };
        let (width, height, data) = match frame.format() {
            PixelFormat::Rgb24 => self.process::<Rgb<u8>>(&frame)?,
            PixelFormat::Gray8 => self.process::<Luma<u8>>(&frame)?,
            other => return Err(CaptureError::UnsupportedFormat(other)),
        };

        let mut out = Frame::new(width, height, frame.format(), Bytes::from(data))
            .stamped(frame.sequence());
        out.timestamp = frame.timestamp;
        if let Some(ts) = frame.meta.device_timestamp {
            out = out.with_device_timestamp(ts);
        }
        Ok(out)
    }

    fn process<P>(&self, frame: &Frame) -> Result<(u32, u32, Vec<u8>), CaptureError>
    where
        P: Pixel<Subpixel = u8> + 'static,
    {
        let mut img: ImageBuffer<P, Vec<u8>> =
            ImageBuffer::from_raw(frame.width(), frame.height(), frame.data.to_vec()).ok_or_else(
                || {
                    CaptureError::Transform(format!(
                        "buffer of {} bytes does not hold a {}x{} {:?} image",
                        frame.data.len(),
                        frame.width(),
                        frame.height(),
                        frame.format()
                    ))
                },
            )?;

        if let Some((w, h)) = self.resize {
            if (w, h) != img.dimensions() {
                img = imageops::resize(&img, w, h, FilterType::Triangle);
            }
        }
        if self.mirror {
            imageops::flip_horizontal_in_place(&mut img);
        }

        let (w, h) = img.dimensions();
        Ok((w, h, img.into_raw()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_flips_columns() {
        let frame = Frame::new(3, 1, PixelFormat::Gray8, vec![1u8, 2, 3]).stamped(9);
        let out = FrameTransform::new(true, None).apply(frame).unwrap();

        assert_eq!(&out.data[..], &[3, 2, 1]);
        assert_eq!(out.sequence(), 9);
    }

    #[test]
    fn resize_changes_dimensions() {
        let frame = Frame::new(8, 4, PixelFormat::Rgb24, vec![200u8; 8 * 4 * 3]);
        let out = FrameTransform::new(false, Some((4, 2))).apply(frame).unwrap();

        assert_eq!((out.width(), out.height()), (4, 2));
        assert_eq!(out.data.len(), 4 * 2 * 3);
        assert!(out.data.iter().all(|&v| v == 200));
    }

    #[test]
    fn bgr_frames_are_converted_before_mirroring() {
        let frame = Frame::new(2, 1, PixelFormat::Bgr24, vec![1u8, 2, 3, 4, 5, 6]).stamped(4);
        let out = FrameTransform::new(true, None).apply(frame).unwrap();

        assert_eq!(out.format(), PixelFormat::Rgb24);
        assert_eq!(&out.data[..], &[6, 5, 4, 3, 2, 1]);
        assert_eq!(out.sequence(), 4);
    }

    #[test]
    fn yuyv_frames_are_converted_and_resized() {
        let frame = Frame::new(4, 2, PixelFormat::Yuyv4, vec![128u8; 4 * 2 * 2]);
        let out = FrameTransform::new(false, Some((2, 1))).apply(frame).unwrap();

        assert_eq!(out.format(), PixelFormat::Rgb24);
        assert_eq!((out.width(), out.height()), (2, 1));
        assert_eq!(out.data.len(), 2 * 3);
    }

    #[test]
    fn short_packed_payload_is_a_decode_error() {
        let frame = Frame::new(2, 1, PixelFormat::Yuyv4, vec![0u8; 2]);
        let err = FrameTransform::new(true, None).apply(frame).unwrap_err();
        assert!(matches!(err, CaptureError::Decode(_)));
    }

    #[test]
    fn identity_is_passthrough() {
        let frame = Frame::new(1, 1, PixelFormat::Yuyv4, vec![0u8; 2]);
        assert!(FrameTransform::default().apply(frame).is_ok());
    }
}
