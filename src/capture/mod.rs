mod image_sequence;
mod v4l_capture;

pub use image_sequence::ImageSequence;
pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use image::RgbImage;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}

impl<C: CaptureSource + ?Sized> CaptureSource for Box<C> {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        (**self).capture_frame()
    }

    fn resolution(&self) -> (u32, u32) {
        (**self).resolution()
    }
}
