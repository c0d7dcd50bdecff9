use super::Display;
use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

/// Publishes one panel to a v4l2loopback device as a virtual camera
pub struct V4L2Output {
    // Held open so the negotiated format stays in place.
    _device: Device,
    file: File,
    panel: String,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(
        device_path: P,
        panel: &str,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{}) for panel {:?}",
            path.display(),
            width,
            height,
            panel
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;
        let requested = Format::new(width, height, FourCC::new(b"YUYV"));
        let format = Output::set_format(&device, &requested)
            .context("Failed to set YUYV output format")?;

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!(
            "v4l2loopback device ready at {}x{} {}",
            format.width,
            format.height,
            format.fourcc
        );

        Ok(Self {
            _device: device,
            file,
            panel: panel.to_string(),
            width: format.width,
            height: format.height,
        })
    }

    /// Convert RGB frame to YUV422 (YUYV) format
    fn rgb_to_yuyv(rgb_image: &RgbImage) -> Vec<u8> {
        let (width, height) = rgb_image.dimensions();
        let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

        for y in 0..height {
            for x in (0..width).step_by(2) {
                let pixel1 = rgb_image.get_pixel(x, y);
                let pixel2 = if x + 1 < width {
                    rgb_image.get_pixel(x + 1, y)
                } else {
                    pixel1
                };

                let (y1, u1, v1) = rgb_to_yuv(pixel1[0], pixel1[1], pixel1[2]);
                let (y2, u2, v2) = rgb_to_yuv(pixel2[0], pixel2[1], pixel2[2]);

                // Chroma is shared by the pixel pair
                let u = ((u1 as u16 + u2 as u16) / 2) as u8;
                let v = ((v1 as u16 + v2 as u16) / 2) as u8;

                yuyv.extend_from_slice(&[y1, u, y2, v]);
            }
        }

        yuyv
    }
}

fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl Display for V4L2Output {
    fn show(&mut self, label: &str, image: &DynamicImage) -> Result<()> {
        if label != self.panel {
            return Ok(());
        }

        let mut frame = image.to_rgb8();
        if frame.dimensions() != (self.width, self.height) {
            frame = image::imageops::resize(
                &frame,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            );
        }

        self.file
            .write_all(&Self::rgb_to_yuyv(&frame))
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn white_and_black_map_to_luma_extremes() {
        assert!(rgb_to_yuv(255, 255, 255).0 >= 254);
        assert_eq!(rgb_to_yuv(0, 0, 0), (0, 128, 128));
    }

    #[test]
    fn yuyv_packs_two_pixels_in_four_bytes() {
        let img = RgbImage::from_pixel(4, 2, Rgb([0, 0, 0]));
        let packed = V4L2Output::rgb_to_yuyv(&img);
        assert_eq!(packed.len(), 4 * 2 * 2);
        assert_eq!(&packed[..4], &[0, 128, 0, 128]);
    }
}
