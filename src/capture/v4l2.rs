//! Live V4L2 capture with memory-mapped buffers

use std::time::Duration;

use bytes::Bytes;
use tracing::{info, instrument};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::decoder;
use super::frame::{Frame, PixelFormat};
use super::source::CaptureSource;
use crate::config::CaptureConfig;
use crate::error::CaptureError;

/// V4L2 camera decoded to RGB24
pub struct V4l2Source {
    name: String,
    stream: MmapStream<'static>,
    format: PixelFormat,
    width: u32,
    height: u32,
    // Keeps the device handle open for the stream's lifetime
    _device: Device,
}

impl V4l2Source {
    /// Open the device, negotiate the format and start streaming.
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        info!("Initializing V4L2 capture: {}", config.device);

        let device = Device::with_path(&config.device)?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::Device(format!(
                "{} doesn't support video capture",
                config.device
            )));
        }

        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = match config.format {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
            other => return Err(CaptureError::UnsupportedFormat(other)),
        };
        // The driver may round the size to something it supports
        let fmt = device.set_format(&fmt)?;

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, config.buffer_count)?;
        info!(
            "Capture stream started: {}x{} with {} buffers",
            fmt.width, fmt.height, config.buffer_count
        );

        Ok(Self {
            name: config.device.clone(),
            stream,
            format: config.format,
            width: fmt.width,
            height: fmt.height,
            _device: device,
        })
    }
}

impl CaptureSource for V4l2Source {
    #[instrument(skip(self), fields(device = %self.name))]
    fn read(&mut self) -> Result<Frame, CaptureError> {
        let (buf, meta) = self.stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());
        let device_ts = Duration::from_secs(meta.timestamp.sec as u64)
            + Duration::from_micros(meta.timestamp.usec as u64);

        let decoded = decoder::decode_frame(&buf[..used], self.format, self.width, self.height)?;

        Ok(Frame::new(
            decoded.width,
            decoded.height,
            PixelFormat::Rgb24,
            Bytes::from(decoded.rgb),
        )
        .with_device_timestamp(device_ts))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
