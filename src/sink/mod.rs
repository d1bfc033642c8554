//! Frame sinks for annotated output.
//!
//! - `PreviewDisplay`: headless operator preview, the latest frame as a JPEG
//! - `LazyRecorder`: MJPEG-in-AVI recording, opened on the first frame
//!   (encoded with FFmpeg, feature: record-ffmpeg)

use anyhow::Result;
use image::RgbImage;

mod preview;
mod recorder;
#[cfg(feature = "record-ffmpeg")]
mod video;

pub use preview::PreviewDisplay;
pub use recorder::LazyRecorder;
#[cfg(feature = "record-ffmpeg")]
pub use video::VideoWriter;

/// Whether this build can encode recordings.
pub fn recording_supported() -> bool {
    cfg!(feature = "record-ffmpeg")
}

/// Consumer of annotated frames.
pub trait FrameSink {
    fn name(&self) -> &str;

    fn write(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush and close. Called once when the run stops; must tolerate being
    /// called without any prior `write`.
    fn finish(&mut self) -> Result<()>;
}
