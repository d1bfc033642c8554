use std::collections::VecDeque;

use anyhow::Result;
use image::RgbImage;

use super::FrameSource;

/// Source that replays a fixed list of frames, then ends.
pub struct MemorySource {
    frames: VecDeque<RgbImage>,
    frame_count: u64,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into(),
            frame_count: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.frame_count += 1;
        }
        Ok(frame)
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}
