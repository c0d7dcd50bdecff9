mod loopback;
mod snapshot;

pub use loopback::V4L2Output;
pub use snapshot::SnapshotWriter;

use anyhow::Result;
use image::DynamicImage;

/// Trait for display destinations
pub trait Display {
    /// Show one labelled image for the current frame
    fn show(&mut self, label: &str, image: &DynamicImage) -> Result<()>;

    /// Called once all panels of a frame have been shown
    fn end_frame(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Forwards every panel to each wrapped display
#[derive(Default)]
pub struct DisplayFanout {
    displays: Vec<Box<dyn Display>>,
}

impl DisplayFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, display: Box<dyn Display>) {
        self.displays.push(display);
    }

    pub fn is_empty(&self) -> bool {
        self.displays.is_empty()
    }
}

impl Display for DisplayFanout {
    fn show(&mut self, label: &str, image: &DynamicImage) -> Result<()> {
        for display in &mut self.displays {
            display.show(label, image)?;
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        for display in &mut self.displays {
            display.end_frame()?;
        }
        Ok(())
    }
}
