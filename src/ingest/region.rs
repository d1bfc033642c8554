use anyhow::Result;
use image::RgbImage;

use super::FrameSource;
use crate::frame::CaptureRegion;

/// Crops every frame of the inner source to a top-left capture region.
pub struct RegionSource {
    inner: Box<dyn FrameSource>,
    region: CaptureRegion,
}

impl RegionSource {
    pub fn new(inner: Box<dyn FrameSource>, region: CaptureRegion) -> Self {
        Self { inner, region }
    }

    pub fn region(&self) -> CaptureRegion {
        self.region
    }
}

impl FrameSource for RegionSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn connect(&mut self) -> Result<()> {
        self.inner.connect()?;
        log::info!(
            "capture region {}x{} at top-left of {}",
            self.region.width,
            self.region.height,
            self.inner.name()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(self
            .inner
            .next_frame()?
            .map(|frame| self.region.crop(&frame)))
    }

    fn frames_captured(&self) -> u64 {
        self.inner.frames_captured()
    }
}
