use super::ops::{ensure_same_size, to_gray};
use super::types::{Mask, MotionStrategy, Panel, Phase, Step};
use crate::error::{MotionError, Result};
use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::{Array2, ArrayView2, Zip};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveSettings {
    /// Weight of the newest frame in the running background (alpha)
    pub learning_rate: f32,
    pub threshold: u8,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            threshold: 50,
        }
    }
}

impl AdaptiveSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.learning_rate) {
            return Err(MotionError::InvalidSettings(format!(
                "adaptive learning rate {} is outside [0, 1]",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Running background estimate updated by exponential smoothing
///
/// The background is seeded from the first trained frame only. Each call to
/// [`Self::update`] blends the new frame in at the configured learning rate,
/// so the estimate stays a convex combination of every frame seen so far.
/// Masks must be computed before the frame is blended in, otherwise the frame
/// is partly compared against itself; [`Self::process`] enforces that order.
pub struct AdaptiveBackgroundModel {
    settings: AdaptiveSettings,
    background: Array2<f32>,
    trained: bool,
    stopped: bool,
}

impl AdaptiveBackgroundModel {
    pub fn new(settings: AdaptiveSettings) -> Result<Self> {
        settings.validate()?;
        tracing::info!(
            "Adaptive background: alpha={}, threshold={}",
            settings.learning_rate,
            settings.threshold
        );
        Ok(Self {
            settings,
            background: Array2::zeros((0, 0)),
            trained: false,
            stopped: false,
        })
    }

    /// Raw floating point background, `None` before training
    pub fn background(&self) -> Option<&Array2<f32>> {
        self.trained.then_some(&self.background)
    }

    /// Seed the background from `frame`; only the first call has an effect
    pub fn train(&mut self, frame: &GrayImage) -> Result<()> {
        if self.trained {
            return Ok(());
        }
        tracing::info!("Storing initial background");
        self.background = frame_view(frame)?.mapv(f32::from);
        self.trained = true;
        Ok(())
    }

    /// Unthresholded `|frame - background|`, rounded to the 8-bit range
    ///
    /// For display only: [`Self::detect`] thresholds the unrounded distance,
    /// so a pixel shown here as exactly the threshold may still be motion.
    pub fn difference(&self, frame: &GrayImage) -> Result<GrayImage> {
        self.map_distance(frame, |d| d.round().clamp(0.0, 255.0) as u8)
    }

    /// Foreground mask against the current background, before any update
    pub fn detect(&self, frame: &GrayImage) -> Result<Mask> {
        let threshold = f32::from(self.settings.threshold);
        self.map_distance(frame, |d| if d > threshold { 255 } else { 0 })
    }

    /// `background <- alpha * frame + (1 - alpha) * background`
    pub fn update(&mut self, frame: &GrayImage) -> Result<()> {
        let view = self.checked_view(frame)?;
        let alpha = self.settings.learning_rate;

        Zip::from(&mut self.background)
            .and(&view)
            .for_each(|bg, &px| *bg = alpha * f32::from(px) + (1.0 - alpha) * *bg);

        Ok(())
    }

    /// Background rounded and clamped for display
    pub fn background_image(&self) -> Option<GrayImage> {
        let background = self.background()?;
        let (rows, cols) = background.dim();
        let data = background
            .iter()
            .map(|&v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        GrayImage::from_raw(cols as u32, rows as u32, data)
    }

    /// Train, detect, then update, returning the mask and raw difference
    pub fn process_gray(&mut self, frame: &GrayImage) -> Result<(Mask, GrayImage)> {
        let _span = tracing::debug_span!("adaptive_background").entered();

        self.train(frame)?;
        let difference = self.difference(frame)?;
        let mask = self.detect(frame)?;
        self.update(frame)?;

        Ok((mask, difference))
    }

    fn checked_view<'a>(&self, frame: &'a GrayImage) -> Result<ArrayView2<'a, u8>> {
        if !self.trained {
            return Err(MotionError::Untrained);
        }
        let (rows, cols) = self.background.dim();
        ensure_same_size((cols as u32, rows as u32), frame.dimensions())?;
        frame_view(frame)
    }

    fn map_distance<F>(&self, frame: &GrayImage, f: F) -> Result<GrayImage>
    where
        F: Fn(f32) -> u8,
    {
        let view = self.checked_view(frame)?;
        let data = Zip::from(&view)
            .and(&self.background)
            .map_collect(|&px, &bg| f((f32::from(px) - bg).abs()))
            .into_raw_vec();

        GrayImage::from_raw(frame.width(), frame.height(), data)
            .ok_or(MotionError::DimensionMismatch {
                expected: frame.dimensions(),
                actual: frame.dimensions(),
            })
    }
}

fn frame_view(frame: &GrayImage) -> Result<ArrayView2<'_, u8>> {
    let (width, height) = frame.dimensions();
    ArrayView2::from_shape((height as usize, width as usize), frame.as_raw().as_slice())
        .map_err(|e| MotionError::InvalidSettings(format!("frame buffer shape: {e}")))
}

impl MotionStrategy for AdaptiveBackgroundModel {
    fn name(&self) -> &'static str {
        "adaptive background"
    }

    fn process(&mut self, frame: &RgbImage) -> Result<Step> {
        if self.stopped {
            return Err(MotionError::Stopped);
        }
        let gray = to_gray(frame);
        let (mask, difference) = self.process_gray(&gray)?;

        let mut panels = vec![
            Panel::new("Frame", DynamicImage::ImageRgb8(frame.clone())),
            Panel::new("Motion Mask", DynamicImage::ImageLuma8(difference)),
        ];
        if let Some(background) = self.background_image() {
            panels.push(Panel::new("Background", DynamicImage::ImageLuma8(background)));
        }

        Ok(Step {
            panels,
            mask: Some(mask),
            mask_label: "Motion",
        })
    }

    fn phase(&self) -> Phase {
        if self.stopped {
            Phase::Stopped
        } else if self.trained {
            Phase::SteadyState
        } else {
            Phase::Idle
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn flat(value: u8) -> GrayImage {
        GrayImage::from_pixel(3, 2, Luma([value]))
    }

    fn model() -> AdaptiveBackgroundModel {
        AdaptiveBackgroundModel::new(AdaptiveSettings::default()).unwrap()
    }

    #[test]
    fn single_update_blends_at_alpha() {
        let mut m = model();
        m.train(&flat(100)).unwrap();
        m.update(&flat(200)).unwrap();
        let bg = m.background().unwrap();
        assert!(bg.iter().all(|&v| (v - 105.0).abs() < 1e-4), "{bg:?}");
    }

    #[test]
    fn converges_geometrically_toward_constant_input() {
        let mut m = model();
        m.train(&flat(100)).unwrap();

        let mut distance = 100.0f32;
        for _ in 0..50 {
            m.update(&flat(200)).unwrap();
            let next = 200.0 - m.background().unwrap()[[0, 0]];
            assert!(next < distance);
            assert!((next / distance - 0.95).abs() < 1e-3);
            distance = next;
        }
    }

    #[test]
    fn second_training_call_is_ignored() {
        let mut m = model();
        m.train(&flat(40)).unwrap();
        m.train(&flat(220)).unwrap();
        assert!(m.background().unwrap().iter().all(|&v| v == 40.0));
    }

    #[test]
    fn detects_before_updating() {
        let mut m = model();
        let (mask, diff) = m.process_gray(&flat(10)).unwrap();
        assert!(mask.iter().all(|&v| v == 0));
        assert!(diff.iter().all(|&v| v == 0));

        let (mask, diff) = m.process_gray(&flat(70)).unwrap();
        assert!(mask.iter().all(|&v| v == 255));
        assert!(diff.iter().all(|&v| v == 60));
        // 0.05 * 70 + 0.95 * 10 = 13
        assert_eq!(m.background_image().unwrap().get_pixel(0, 0)[0], 13);
    }

    #[test]
    fn detect_requires_training() {
        let m = model();
        assert!(matches!(m.detect(&flat(0)), Err(MotionError::Untrained)));
        assert!(m.background_image().is_none());
    }

    #[test]
    fn mismatched_frame_is_rejected() {
        let mut m = model();
        m.train(&flat(0)).unwrap();
        let other = GrayImage::new(5, 5);
        assert!(matches!(
            m.update(&other),
            Err(MotionError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn learning_rate_outside_unit_interval_is_rejected() {
        let settings = AdaptiveSettings {
            learning_rate: 1.5,
            ..Default::default()
        };
        assert!(AdaptiveBackgroundModel::new(settings).is_err());
    }

    #[test]
    fn mask_keeps_frame_layout() {
        let mut m = model();
        m.train(&flat(0)).unwrap();
        let mut frame = flat(0);
        frame.put_pixel(2, 1, Luma([255]));
        let mask = m.detect(&frame).unwrap();
        assert_eq!(mask.get_pixel(2, 1)[0], 255);
        assert_eq!(mask.iter().filter(|&&v| v == 255).count(), 1);
    }

    #[test]
    fn mask_uses_unrounded_distance() {
        let mut m = model();
        m.train(&flat(100)).unwrap();
        m.update(&flat(104)).unwrap();

        // Background is now 100.2: 50 is 50.2 away, shown as 50 but over the threshold.
        let (mask, diff) = m.process_gray(&flat(50)).unwrap();
        assert!(diff.iter().all(|&v| v == 50));
        assert!(mask.iter().all(|&v| v == 255));
    }

    #[test]
    fn phase_follows_training_and_stop() {
        let mut m = model();
        assert_eq!(MotionStrategy::phase(&m), Phase::Idle);
        m.process(&RgbImage::new(3, 2)).unwrap();
        assert_eq!(MotionStrategy::phase(&m), Phase::SteadyState);
        m.stop();
        assert_eq!(MotionStrategy::phase(&m), Phase::Stopped);
        assert!(matches!(
            m.process(&RgbImage::new(3, 2)),
            Err(MotionError::Stopped)
        ));
    }
}
