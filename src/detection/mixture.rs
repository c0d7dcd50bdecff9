use super::gmm::{GaussianMixture, MogSettings};
use super::types::{Mask, MotionStrategy, Panel, Phase, Step};
use crate::error::{MotionError, Result};
use image::{DynamicImage, RgbImage};

/// Mixture-of-Gaussians background subtraction
///
/// Thin adapter over [`GaussianMixture`]: frames and the learning rate are
/// passed through unchanged and the model owns all per-pixel state.
pub struct MixtureOfGaussiansModel {
    model: GaussianMixture,
    learning_rate: f32,
    stopped: bool,
}

impl MixtureOfGaussiansModel {
    pub fn new(settings: MogSettings) -> Result<Self> {
        let model = GaussianMixture::new(settings)?;
        tracing::info!(
            "Mixture of Gaussians: history={}, mixtures={}, learning rate={}",
            settings.history,
            settings.mixtures,
            settings.learning_rate
        );
        Ok(Self {
            model,
            learning_rate: settings.learning_rate,
            stopped: false,
        })
    }

    /// Update the model with `frame` and return a fresh foreground mask
    pub fn apply(&mut self, frame: &RgbImage, learning_rate: f32) -> Result<Mask> {
        let _span = tracing::debug_span!("mixture_of_gaussians").entered();
        self.model.apply(frame, learning_rate)
    }

    pub fn background_image(&self) -> Option<RgbImage> {
        self.model.background_image()
    }
}

impl MotionStrategy for MixtureOfGaussiansModel {
    fn name(&self) -> &'static str {
        "mixture of Gaussians"
    }

    fn process(&mut self, frame: &RgbImage) -> Result<Step> {
        if self.stopped {
            return Err(MotionError::Stopped);
        }
        let mask = self.apply(frame, self.learning_rate)?;

        let mut panels = vec![Panel::new("Frame", DynamicImage::ImageRgb8(frame.clone()))];
        if let Some(background) = self.background_image() {
            panels.push(Panel::new("Background", DynamicImage::ImageRgb8(background)));
        }

        Ok(Step {
            panels,
            mask: Some(mask),
            mask_label: "Foreground Mask",
        })
    }

    fn phase(&self) -> Phase {
        if self.stopped {
            Phase::Stopped
        } else if self.model.frames_seen() == 0 {
            Phase::Idle
        } else {
            Phase::SteadyState
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}
