use crate::error::{MotionError, Result};
use image::{imageops, GrayImage, RgbImage};

use super::Mask;

/// Convert an RGB frame to single-channel luma of the same size
pub fn to_gray(frame: &RgbImage) -> GrayImage {
    imageops::grayscale(frame)
}

/// Pixelwise `|a - b|`
pub fn absdiff(a: &GrayImage, b: &GrayImage) -> Result<GrayImage> {
    ensure_same_size(a.dimensions(), b.dimensions())?;

    let data = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&x, &y)| x.abs_diff(y))
        .collect();

    GrayImage::from_raw(a.width(), a.height(), data)
        .ok_or_else(|| MotionError::InvalidSettings("difference buffer size".into()))
}

/// Binary threshold: pixels strictly above `threshold` become 255, the rest 0
pub fn threshold_binary(image: &GrayImage, threshold: u8) -> Mask {
    let mut mask = image.clone();
    for value in mask.iter_mut() {
        *value = if *value > threshold { 255 } else { 0 };
    }
    mask
}

/// Fraction of mask pixels marked as foreground
pub fn foreground_ratio(mask: &Mask) -> f64 {
    let total = mask.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    let lit = mask.as_raw().iter().filter(|&&v| v != 0).count();
    lit as f64 / total as f64
}

pub(crate) fn ensure_same_size(expected: (u32, u32), actual: (u32, u32)) -> Result<()> {
    if expected != actual {
        return Err(MotionError::DimensionMismatch { expected, actual });
    }
    Ok(())
}
