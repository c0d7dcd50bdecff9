use super::CaptureSource;
use crate::error::MotionError;
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "pgm"];

/// Replays still images from a directory in file name order
///
/// Stands in for a camera when running headless. Once the last image has
/// been returned every further capture fails with
/// [`MotionError::EndOfStream`].
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    next: usize,
    width: u32,
    height: u32,
}

impl ImageSequence {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        tracing::info!("Reading frames from {}", dir.display());

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?
        {
            let path = entry?.path();
            let supported = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if supported {
                paths.push(path);
            }
        }
        paths.sort();

        let first = paths
            .first()
            .with_context(|| format!("No images found in {}", dir.display()))?;
        let (width, height) = image::image_dimensions(first)
            .with_context(|| format!("Failed to read {}", first.display()))?;

        tracing::info!("Found {} frames at {}x{}", paths.len(), width, height);

        Ok(Self {
            paths,
            next: 0,
            width,
            height,
        })
    }
}

impl CaptureSource for ImageSequence {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        let path = self.paths.get(self.next).ok_or(MotionError::EndOfStream)?;
        self.next += 1;

        let frame = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .to_rgb8();
        Ok(frame)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn replays_in_name_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
            RgbImage::from_pixel(3, 2, Rgb([value, value, value]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut seq = ImageSequence::open(dir.path()).unwrap();
        assert_eq!(seq.resolution(), (3, 2));

        for expected in [10u8, 20, 30] {
            let frame = seq.capture_frame().unwrap();
            assert_eq!(frame.get_pixel(0, 0)[0], expected);
        }

        let err = seq.capture_frame().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MotionError>(),
            Some(MotionError::EndOfStream)
        ));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequence::open(dir.path()).is_err());
    }
}
