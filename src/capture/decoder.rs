//! Raw device payloads to interleaved RGB24

use bytes::Bytes;

use super::frame::{Frame, PixelFormat};
use crate::error::CaptureError;

/// Decoded RGB24 image
#[derive(Debug)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// Decode a device payload of the given format into RGB24.
///
/// `width`/`height` are the negotiated capture dimensions; MJPEG frames report
/// their own size from the bitstream.
pub fn decode_frame(
    data: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<DecodedImage, CaptureError> {
    let pixels = (width as usize) * (height as usize);
    match format {
        PixelFormat::Mjpeg => decode_jpeg(data),
        PixelFormat::Rgb24 => {
            expect_len(data, pixels * 3)?;
            Ok(DecodedImage {
                width,
                height,
                rgb: data.to_vec(),
            })
        }
        PixelFormat::Bgr24 => {
            expect_len(data, pixels * 3)?;
            let mut rgb = Vec::with_capacity(data.len());
            for px in data.chunks_exact(3) {
                rgb.extend_from_slice(&[px[2], px[1], px[0]]);
            }
            Ok(DecodedImage { width, height, rgb })
        }
        PixelFormat::Gray8 => {
            expect_len(data, pixels)?;
            Ok(DecodedImage {
                width,
                height,
                rgb: gray_to_rgb(data),
            })
        }
        PixelFormat::Yuyv4 => {
            expect_len(data, pixels * 2)?;
            Ok(DecodedImage {
                width,
                height,
                rgb: yuyv_to_rgb(data),
            })
        }
    }
}

/// Convert a frame of any supported format into an RGB24 frame, keeping its metadata.
pub fn to_rgb(frame: &Frame) -> Result<Frame, CaptureError> {
    if frame.format() == PixelFormat::Rgb24 {
        return Ok(frame.clone());
    }

    let decoded = decode_frame(&frame.data, frame.format(), frame.width(), frame.height())?;
    let mut out = Frame::new(
        decoded.width,
        decoded.height,
        PixelFormat::Rgb24,
        Bytes::from(decoded.rgb),
    )
    .stamped(frame.sequence());
    out.timestamp = frame.timestamp;
    if let Some(ts) = frame.meta.device_timestamp {
        out = out.with_device_timestamp(ts);
    }
    Ok(out)
}

fn expect_len(data: &[u8], expected: usize) -> Result<(), CaptureError> {
    if data.len() < expected {
        return Err(CaptureError::Decode(format!(
            "payload too short: {} bytes, expected {}",
            data.len(),
            expected
        )));
    }
    Ok(())
}

#[cfg(feature = "fast-jpeg")]
fn decode_jpeg(data: &[u8]) -> Result<DecodedImage, CaptureError> {
    let mut decoder = zune_jpeg::JpegDecoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| CaptureError::Decode(format!("{:?}", e)))?;
    let (width, height) = decoder
        .dimensions()
        .ok_or_else(|| CaptureError::Decode("JPEG without dimensions".into()))?;

    let rgb = if pixels.len() == width * height {
        gray_to_rgb(&pixels)
    } else {
        pixels
    };

    Ok(DecodedImage {
        width: width as u32,
        height: height as u32,
        rgb,
    })
}

#[cfg(not(feature = "fast-jpeg"))]
fn decode_jpeg(data: &[u8]) -> Result<DecodedImage, CaptureError> {
    use jpeg_decoder::{Decoder, PixelFormat as JpegFormat};

    let mut decoder = Decoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| CaptureError::Decode(e.to_string()))?;
    let info = decoder
        .info()
        .ok_or_else(|| CaptureError::Decode("JPEG without header info".into()))?;

    let rgb = match info.pixel_format {
        JpegFormat::RGB24 => pixels,
        JpegFormat::L8 => gray_to_rgb(&pixels),
        other => {
            return Err(CaptureError::Decode(format!(
                "unsupported JPEG pixel format {:?}",
                other
            )))
        }
    };

    Ok(DecodedImage {
        width: u32::from(info.width),
        height: u32::from(info.height),
        rgb,
    })
}

fn gray_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() * 3);
    for &y in data {
        rgb.extend_from_slice(&[y, y, y]);
    }
    rgb
}

/// BT.601 limited-range YUYV (YUY2) to RGB24.
fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    rgb
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;

    let clamp = |x: i32| x.clamp(0, 255) as u8;
    [
        clamp((298 * c + 409 * e + 128) >> 8),
        clamp((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp((298 * c + 516 * d + 128) >> 8),
    ]
}
