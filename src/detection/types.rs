use crate::error::Result;
use image::{DynamicImage, GrayImage, RgbImage};

/// Binary foreground mask: 0 = background, 255 = motion
/// Dimensions match the input frame dimensions
pub type Mask = GrayImage;

/// Where a detector is in its session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Frame history is still filling; no masks yet
    WarmingUp,
    SteadyState,
    Stopped,
}

/// A labelled image handed to the display
pub struct Panel {
    pub label: &'static str,
    pub image: DynamicImage,
}

impl Panel {
    pub fn new(label: &'static str, image: DynamicImage) -> Self {
        Self { label, image }
    }
}

/// Everything one strategy produced for one frame
pub struct Step {
    /// Intermediate views (input, history, background, raw difference)
    pub panels: Vec<Panel>,
    /// Foreground mask, absent while warming up
    pub mask: Option<Mask>,
    /// Display label for the mask
    pub mask_label: &'static str,
}

/// Trait for motion detection strategies
/// Allows the session loop to drive frame differencing, adaptive background
/// and the Gaussian mixture model interchangeably
pub trait MotionStrategy {
    /// Human readable name used in logs
    fn name(&self) -> &'static str;

    /// Process one raw frame, updating internal state
    fn process(&mut self, frame: &RgbImage) -> Result<Step>;

    /// Current lifecycle phase
    fn phase(&self) -> Phase {
        Phase::SteadyState
    }

    /// Enter [`Phase::Stopped`]; later frames are rejected
    fn stop(&mut self);
}
