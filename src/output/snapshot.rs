use super::Display;
use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// Saves every panel as PNG once every `every` frames
pub struct SnapshotWriter {
    dir: PathBuf,
    every: u64,
    frame: u64,
}

impl SnapshotWriter {
    pub fn new<P: AsRef<Path>>(dir: P, every: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot directory {}", dir.display()))?;
        tracing::info!("Writing snapshots to {} every {} frames", dir.display(), every.max(1));

        Ok(Self {
            dir,
            every: every.max(1),
            frame: 0,
        })
    }

    fn path_for(&self, label: &str) -> PathBuf {
        let slug: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        self.dir.join(format!("{:06}_{}.png", self.frame, slug))
    }
}

impl Display for SnapshotWriter {
    fn show(&mut self, label: &str, image: &DynamicImage) -> Result<()> {
        if self.frame % self.every != 0 {
            return Ok(());
        }
        let path = self.path_for(label);
        image
            .save(&path)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        tracing::debug!("Saved {}", path.display());
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.frame += 1;
        Ok(())
    }
}
