//! Frame geometry helpers.
//!
//! Frames are plain `image::RgbImage` buffers owned by one driver iteration.

use anyhow::{anyhow, Result};
use image::{imageops, imageops::FilterType, RgbImage};

/// Default working width frames are resized to before detection.
pub const DEFAULT_WORKING_WIDTH: u32 = 700;

/// Resize `frame` to `width` pixels wide, preserving the aspect ratio.
///
/// Frames already at the target width are returned unchanged.
pub fn resize_to_width(frame: RgbImage, width: u32) -> Result<RgbImage> {
    let (src_w, src_h) = frame.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(anyhow!("cannot resize an empty {}x{} frame", src_w, src_h));
    }
    if width == 0 {
        return Err(anyhow!("working width must be greater than zero"));
    }
    if src_w == width {
        return Ok(frame);
    }
    let height = ((src_h as f64 * width as f64 / src_w as f64).round() as u32).max(1);
    Ok(imageops::resize(&frame, width, height, FilterType::Triangle))
}

/// Fit `frame` to exactly `width` x `height`, stretching if needed.
pub fn fit_to(frame: &RgbImage, width: u32, height: u32) -> RgbImage {
    if frame.dimensions() == (width, height) {
        return frame.clone();
    }
    imageops::resize(frame, width, height, FilterType::Triangle)
}

/// Capture region anchored at the top-left corner of the source frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureRegion {
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!(
                "capture region must be non-empty (got {}x{})",
                width,
                height
            ));
        }
        Ok(Self { width, height })
    }

    /// Crop `frame` to the region. A region larger than the frame keeps the frame size.
    pub fn crop(&self, frame: &RgbImage) -> RgbImage {
        let width = self.width.min(frame.width());
        let height = self.height.min(frame.height());
        imageops::crop_imm(frame, 0, 0, width, height).to_image()
    }
}
