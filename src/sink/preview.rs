use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use super::FrameSink;

/// Headless operator display: keeps the most recent annotated frame on disk.
///
/// Each frame is written to a sibling temp file and renamed over the preview,
/// so a viewer never reads a half-written image.
pub struct PreviewDisplay {
    path: PathBuf,
    frames_shown: u64,
}

impl PreviewDisplay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frames_shown: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl FrameSink for PreviewDisplay {
    fn name(&self) -> &str {
        "preview"
    }

    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 80)
            .encode_image(frame)
            .context("failed to encode preview frame")?;

        let staging = self.path.with_extension("tmp");
        std::fs::write(&staging, &jpeg)
            .with_context(|| format!("failed to write preview {}", staging.display()))?;
        std::fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to publish preview {}", self.path.display()))?;

        if self.frames_shown == 0 {
            log::info!("preview: writing latest frame to {}", self.path.display());
        }
        self.frames_shown += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        log::debug!("preview: {} frames shown", self.frames_shown);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_latest_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("preview.jpg");
        let mut display = PreviewDisplay::new(&path);

        display.write(&RgbImage::new(32, 16))?;
        display.write(&RgbImage::new(40, 20))?;
        display.finish()?;

        let shown = image::open(&path)?;
        assert_eq!((shown.width(), shown.height()), (40, 20));
        assert_eq!(display.frames_shown(), 2);
        assert!(!path.with_extension("tmp").exists());
        Ok(())
    }
}
