//! Playback of a recorded clip stored as a directory of image files

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info};

use super::frame::{Frame, PixelFormat};
use super::source::CaptureSource;
use crate::error::CaptureError;

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Reads `*.png` / `*.jpg` frames from a directory in file-name order.
pub struct ImageSequenceSource {
    name: String,
    files: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
    dimensions: Option<(u32, u32)>,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, looping: bool) -> Result<Self, CaptureError> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if path.is_file() && is_image {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(CaptureError::Device(format!(
                "no image frames found in {}",
                dir.display()
            )));
        }

        info!("Image sequence {}: {} frames", dir.display(), files.len());

        Ok(Self {
            name: dir.display().to_string(),
            files,
            cursor: 0,
            looping,
            dimensions: None,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl CaptureSource for ImageSequenceSource {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Err(CaptureError::Exhausted);
            }
            debug!("Image sequence rewound");
            self.cursor = 0;
        }

        let path = &self.files[self.cursor];
        self.cursor += 1;

        let img = image::open(path)?.into_rgb8();
        let dims = img.dimensions();
        match self.dimensions {
            None => self.dimensions = Some(dims),
            Some(expected) if expected != dims => {
                return Err(CaptureError::Decode(format!(
                    "{} is {}x{}, sequence is {}x{}",
                    path.display(),
                    dims.0,
                    dims.1,
                    expected.0,
                    expected.1
                )));
            }
            Some(_) => {}
        }

        Ok(Frame::new(
            dims.0,
            dims.1,
            PixelFormat::Rgb24,
            Bytes::from(img.into_raw()),
        ))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_frame(dir: &Path, name: &str, w: u32, h: u32, value: u8) {
        RgbImage::from_pixel(w, h, Rgb([value, value, value]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn plays_frames_in_name_order_then_exhausts() {
        let tmp = TempDir::new().unwrap();
        write_frame(tmp.path(), "frame_002.png", 4, 4, 20);
        write_frame(tmp.path(), "frame_001.png", 4, 4, 10);
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(tmp.path(), false).unwrap();
        assert_eq!(source.len(), 2);

        assert_eq!(source.read().unwrap().data[0], 10);
        assert_eq!(source.read().unwrap().data[0], 20);
        assert!(source.read().unwrap_err().is_exhausted());
    }

    #[test]
    fn looping_rewinds() {
        let tmp = TempDir::new().unwrap();
        write_frame(tmp.path(), "a.png", 2, 2, 1);

        let mut source = ImageSequenceSource::open(tmp.path(), true).unwrap();
        for _ in 0..3 {
            assert_eq!(source.read().unwrap().data[0], 1);
        }
    }

    #[test]
    fn mismatched_dimensions_are_transient() {
        let tmp = TempDir::new().unwrap();
        write_frame(tmp.path(), "a.png", 2, 2, 1);
        write_frame(tmp.path(), "b.png", 3, 3, 1);
        write_frame(tmp.path(), "c.png", 2, 2, 5);

        let mut source = ImageSequenceSource::open(tmp.path(), false).unwrap();
        assert!(source.read().is_ok());
        assert!(matches!(source.read(), Err(CaptureError::Decode(_))));
        assert_eq!(source.read().unwrap().data[0], 5);
    }

    #[test]
    fn empty_directory_is_rejected() {
        let tmp = TempDir::new().unwrap();
        assert!(ImageSequenceSource::open(tmp.path(), false).is_err());
    }
}
