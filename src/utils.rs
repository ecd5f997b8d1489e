use std::time::Duration;

/// Capture period for a target rate. Non-positive or non-finite rates free-run.
pub fn frame_period(fps: f64) -> Duration {
    if fps.is_finite() && fps > 0.0 {
        Duration::from_secs_f64(1.0 / fps)
    } else {
        Duration::ZERO
    }
}

/// Auto-detect the first V4L2 device that can capture MJPEG or YUYV
#[cfg(feature = "v4l2")]
pub fn auto_detect_device() -> Option<(String, crate::capture::PixelFormat)> {
    use crate::capture::PixelFormat;
    use std::path::Path;
    use tracing::info;
    use v4l::{capability::Flags, video::Capture, Device, FourCC};

    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }

        // Prefer devices with MJPEG support
        if let Ok(formats) = dev.enum_formats() {
            for fmt in formats {
                if fmt.fourcc == FourCC::new(b"MJPG") {
                    info!("Found MJPEG device: {} - {}", path, caps.card);
                    return Some((path, PixelFormat::Mjpeg));
                } else if fmt.fourcc == FourCC::new(b"YUYV") {
                    info!("Found YUYV device: {} - {}", path, caps.card);
                    return Some((path, PixelFormat::Yuyv4));
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_from_fps() {
        assert_eq!(frame_period(16.0), Duration::from_millis(62) + Duration::from_micros(500));
        assert_eq!(frame_period(0.0), Duration::ZERO);
        assert_eq!(frame_period(f64::INFINITY), Duration::ZERO);
    }
}
