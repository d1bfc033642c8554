//! Frame ingestion sources.
//!
//! This module provides different sources for frames:
//! - Synthetic stream (`stub://`, testing and demo runs)
//! - In-memory frame queue (testing)
//! - Local image files or a directory of images
//! - Local video files (feature: ingest-ffmpeg)
//!
//! `RegionSource` wraps any of them to crop each frame to the operator's
//! capture region.
//!
//! A source yields `Ok(None)` once it has no more frames. The driver treats that
//! as a normal end of stream. Errors are faults and end the run.

use anyhow::Result;
use image::RgbImage;

use crate::frame::CaptureRegion;

pub mod file;
#[cfg(feature = "ingest-ffmpeg")]
pub(crate) mod file_ffmpeg;
mod memory;
mod region;
pub mod synthetic;

pub use file::FileSource;
pub use memory::MemorySource;
pub use region::RegionSource;
pub use synthetic::SyntheticSource;

/// A producer of frames for the pipeline driver.
pub trait FrameSource {
    /// Human-readable source name for logs.
    fn name(&self) -> &str;

    /// Open the underlying stream. Called once before the first frame.
    fn connect(&mut self) -> Result<()>;

    /// Next frame, or `None` when the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Frames handed out so far.
    fn frames_captured(&self) -> u64;
}

/// Open the source named by `input`, optionally cropped to `region`.
///
/// `stub://` URLs produce a synthetic stream. Anything else is a local path.
pub fn open_source(input: &str, region: Option<CaptureRegion>) -> Result<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource> = if input.starts_with("stub://") {
        Box::new(SyntheticSource::from_url(input)?)
    } else {
        Box::new(FileSource::new(input)?)
    };
    Ok(match region {
        Some(region) => Box::new(RegionSource::new(source, region)),
        None => source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_urls_open_synthetic_sources() -> Result<()> {
        let mut source = open_source("stub://camera?frames=1", None)?;
        source.connect()?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn region_wraps_any_source() -> Result<()> {
        let region = CaptureRegion::new(32, 16)?;
        let mut source = open_source("stub://camera?width=64&height=48", Some(region))?;
        source.connect()?;
        let frame = source.next_frame()?.ok_or_else(|| anyhow::anyhow!("no frame"))?;
        assert_eq!(frame.dimensions(), (32, 16));
        Ok(())
    }

    #[test]
    fn remote_urls_are_rejected() {
        assert!(open_source("rtsp://camera.local/stream", None).is_err());
    }
}
