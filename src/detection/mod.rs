mod adaptive;
mod frame_difference;
pub mod gmm;
mod mixture;
pub mod ops;
pub mod ring_buffer;
pub mod types;

pub use adaptive::{AdaptiveBackgroundModel, AdaptiveSettings};
pub use frame_difference::{FrameDifference, FrameDifferenceDetector, FrameDifferenceSettings};
pub use gmm::{GaussianMixture, MogSettings};
pub use mixture::MixtureOfGaussiansModel;
pub use ring_buffer::{RingBuffer, Sequence};
pub use types::{Mask, MotionStrategy, Panel, Phase, Step};

use crate::error::Result;

/// The three detection strategies offered by the menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Strategy {
    FrameDifference,
    AdaptiveBackground,
    MixtureOfGaussians,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::FrameDifference,
        Strategy::AdaptiveBackground,
        Strategy::MixtureOfGaussians,
    ];

    pub fn description(self) -> &'static str {
        match self {
            Strategy::FrameDifference => "frame difference",
            Strategy::AdaptiveBackground => "adaptive background through alpha value",
            Strategy::MixtureOfGaussians => "Mixture of Gaussians (MOG2) method",
        }
    }
}

/// Settings for every strategy, built once from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetectorSettings {
    pub frame_difference: FrameDifferenceSettings,
    pub adaptive: AdaptiveSettings,
    pub mog: MogSettings,
}

impl DetectorSettings {
    pub fn validate(&self) -> Result<()> {
        self.frame_difference.validate()?;
        self.adaptive.validate()?;
        self.mog.validate()
    }
}

/// Create a fresh detector for one session
pub fn create_strategy(
    strategy: Strategy,
    settings: &DetectorSettings,
) -> Result<Box<dyn MotionStrategy>> {
    let detector: Box<dyn MotionStrategy> = match strategy {
        Strategy::FrameDifference => {
            Box::new(FrameDifferenceDetector::new(settings.frame_difference)?)
        }
        Strategy::AdaptiveBackground => Box::new(AdaptiveBackgroundModel::new(settings.adaptive)?),
        Strategy::MixtureOfGaussians => Box::new(MixtureOfGaussiansModel::new(settings.mog)?),
    };
    Ok(detector)
}
