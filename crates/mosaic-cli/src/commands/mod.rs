pub mod build;
pub mod link_order;
pub mod metadata;
pub mod variants;

use anyhow::{Context, Result};
use mosaic_build::{BuildContext, Builder};
use std::path::PathBuf;

/// Project selection shared by every command
pub struct Project {
    pub dir: PathBuf,
    pub serial: bool,
}

impl Project {
    /// Load the project and run the whole build
    pub fn build(&self) -> Result<BuildContext> {
        let mut builder = Builder::new(&self.dir)
            .with_context(|| format!("Failed to load project at {}", self.dir.display()))?;
        if self.serial {
            builder = builder.with_parallel(false);
        }
        builder.build().context("Build failed")
    }
}
