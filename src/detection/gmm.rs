//! Per-pixel Gaussian mixture background model (MOG2 style)
//!
//! Each pixel keeps up to `mixtures` Gaussian components with a weight, an RGB
//! mean and a single isotropic variance. Components are kept sorted by weight
//! so the heaviest ones, which together make up `background_ratio` of the
//! total weight, describe the background.

use super::types::Mask;
use crate::error::{MotionError, Result};
use image::{GrayImage, RgbImage};

const CHANNELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MogSettings {
    /// Frames used to derive the automatic learning rate
    pub history: u32,
    /// Maximum components per pixel
    pub mixtures: usize,
    /// Squared Mahalanobis distance for a background match
    pub var_threshold: f32,
    /// Squared Mahalanobis distance for updating an existing component
    pub var_threshold_gen: f32,
    /// Share of total weight treated as background
    pub background_ratio: f32,
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    /// Pruning strength applied to component weights each frame
    pub complexity_reduction: f32,
    /// Rate handed to `apply`; negative selects the automatic rate
    pub learning_rate: f32,
}

impl Default for MogSettings {
    fn default() -> Self {
        Self {
            history: 500,
            mixtures: 5,
            var_threshold: 16.0,
            var_threshold_gen: 9.0,
            background_ratio: 0.9,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 5.0 * 15.0,
            complexity_reduction: 0.05,
            learning_rate: 0.05,
        }
    }
}

impl MogSettings {
    pub fn validate(&self) -> Result<()> {
        if self.history == 0 {
            return Err(MotionError::InvalidSettings("history must be positive".into()));
        }
        if self.mixtures == 0 || self.mixtures > u8::MAX as usize {
            return Err(MotionError::InvalidSettings(format!(
                "mixture count {} must be in 1..=255",
                self.mixtures
            )));
        }
        if !(self.var_min > 0.0 && self.var_min <= self.var_init && self.var_init <= self.var_max) {
            return Err(MotionError::InvalidSettings(
                "variances must satisfy 0 < min <= init <= max".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.background_ratio) {
            return Err(MotionError::InvalidSettings(
                "background ratio must be in [0, 1]".into(),
            ));
        }
        check_learning_rate(self.learning_rate)
    }
}

fn check_learning_rate(rate: f32) -> Result<()> {
    if rate.is_nan() || rate > 1.0 {
        return Err(MotionError::InvalidSettings(format!(
            "learning rate {rate} must be negative (automatic) or within [0, 1]"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
struct Gaussian {
    weight: f32,
    variance: f32,
    mean: [f32; CHANNELS],
}

pub struct GaussianMixture {
    settings: MogSettings,
    width: u32,
    height: u32,
    /// `width * height * mixtures` components, pixel-major
    components: Vec<Gaussian>,
    /// Components in use per pixel
    used: Vec<u8>,
    frames: u64,
}

impl GaussianMixture {
    pub fn new(settings: MogSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            width: 0,
            height: 0,
            components: Vec::new(),
            used: Vec::new(),
            frames: 0,
        })
    }

    pub fn settings(&self) -> &MogSettings {
        &self.settings
    }

    /// Frames absorbed since the model was (re)initialised
    pub fn frames_seen(&self) -> u64 {
        self.frames
    }

    /// Update the model with `frame` and classify every pixel
    ///
    /// `learning_rate` of 0 freezes the model and 1 replaces it with the
    /// current frame; a negative value uses `1 / min(2 * frames, history)`.
    pub fn apply(&mut self, frame: &RgbImage, learning_rate: f32) -> Result<Mask> {
        check_learning_rate(learning_rate)?;

        if frame.dimensions() != (self.width, self.height) {
            self.reinitialise(frame.width(), frame.height());
        }
        self.frames += 1;

        let alpha = if learning_rate >= 0.0 && self.frames > 1 {
            learning_rate
        } else {
            let window = (2 * self.frames).min(self.settings.history as u64);
            1.0 / window as f32
        };

        let k = self.settings.mixtures;
        let mut mask = GrayImage::new(self.width, self.height);

        for ((pixel, out), (modes, used)) in frame
            .pixels()
            .zip(mask.iter_mut())
            .zip(self.components.chunks_mut(k).zip(self.used.iter_mut()))
        {
            let sample = [pixel[0] as f32, pixel[1] as f32, pixel[2] as f32];
            let background = update_pixel(&self.settings, modes, used, sample, alpha);
            *out = if background { 0 } else { 255 };
        }

        Ok(mask)
    }

    /// Weighted mean of the background components of every pixel
    pub fn background_image(&self) -> Option<RgbImage> {
        if self.frames == 0 {
            return None;
        }
        let k = self.settings.mixtures;
        let mut image = RgbImage::new(self.width, self.height);

        for (out, (modes, &used)) in image
            .pixels_mut()
            .zip(self.components.chunks(k).zip(&self.used))
        {
            let mut acc = [0.0f32; CHANNELS];
            let mut total = 0.0f32;
            for mode in &modes[..used as usize] {
                for (a, m) in acc.iter_mut().zip(mode.mean) {
                    *a += mode.weight * m;
                }
                total += mode.weight;
                if total > self.settings.background_ratio {
                    break;
                }
            }
            if total > 0.0 {
                for (channel, a) in out.0.iter_mut().zip(acc) {
                    *channel = (a / total).round().clamp(0.0, 255.0) as u8;
                }
            }
        }

        Some(image)
    }

    fn reinitialise(&mut self, width: u32, height: u32) {
        if self.frames > 0 {
            tracing::info!(
                "Frame size changed from {}x{} to {}x{}, reinitialising mixture model",
                self.width,
                self.height,
                width,
                height
            );
        }
        let pixels = width as usize * height as usize;
        self.width = width;
        self.height = height;
        self.components = vec![Gaussian::default(); pixels * self.settings.mixtures];
        self.used = vec![0; pixels];
        self.frames = 0;
    }
}

/// Update one pixel's mixture with `sample`, returning true for background
fn update_pixel(
    settings: &MogSettings,
    modes: &mut [Gaussian],
    used: &mut u8,
    sample: [f32; CHANNELS],
    alpha: f32,
) -> bool {
    let prune = -alpha * settings.complexity_reduction;
    let decay = 1.0 - alpha;

    let mut n = *used as usize;
    let mut fits = false;
    let mut background = false;
    let mut total_weight = 0.0f32;

    let mut mode = 0;
    while mode < n {
        let mut weight = decay * modes[mode].weight + prune;
        let mut swap_to = None;

        if !fits {
            let variance = modes[mode].variance;
            let mut dist2 = 0.0f32;
            for (m, s) in modes[mode].mean.iter().zip(sample) {
                dist2 += (m - s) * (m - s);
            }

            if total_weight < settings.background_ratio
                && dist2 < settings.var_threshold * variance
            {
                background = true;
            }

            if dist2 < settings.var_threshold_gen * variance {
                fits = true;
                weight += alpha;

                // A frozen model can match a zero-weight component.
                let rate = if weight > 0.0 { alpha / weight } else { 0.0 };
                for (m, s) in modes[mode].mean.iter_mut().zip(sample) {
                    *m -= rate * (*m - s);
                }
                let updated = variance + rate * (dist2 - variance);
                modes[mode].variance = updated.clamp(settings.var_min, settings.var_max);

                // Keep components ordered by weight.
                let mut target = mode;
                while target > 0 && weight > modes[target - 1].weight {
                    target -= 1;
                }
                if target != mode {
                    swap_to = Some(target);
                }
            }
        }

        if weight < -prune {
            n -= 1;
            modes[mode..=n].rotate_left(1);
            continue;
        }

        modes[mode].weight = weight;
        total_weight += weight;

        if let Some(target) = swap_to {
            modes[target..=mode].rotate_right(1);
        }
        mode += 1;
    }

    if total_weight > 0.0 {
        let scale = 1.0 / total_weight;
        for m in &mut modes[..n] {
            m.weight *= scale;
        }
    }

    if !fits {
        // Append, or replace the weakest component when the mixture is full.
        if n < modes.len() {
            n += 1;
        }
        let slot = n - 1;

        let weight = if n == 1 { 1.0 } else { alpha };
        modes[slot] = Gaussian {
            weight,
            variance: settings.var_init,
            mean: sample,
        };

        let current: f32 = modes[..slot].iter().map(|m| m.weight).sum();
        if current > 0.0 {
            let scale = (1.0 - weight) / current;
            for m in &mut modes[..slot] {
                m.weight *= scale;
            }
        }

        let mut pos = slot;
        while pos > 0 && modes[pos].weight > modes[pos - 1].weight {
            modes.swap(pos, pos - 1);
            pos -= 1;
        }
    }

    *used = n as u8;
    background
}
