use std::path::{Path, PathBuf};

#[cfg(not(feature = "record-ffmpeg"))]
use anyhow::anyhow;
use anyhow::Result;
use image::RgbImage;

#[cfg(feature = "record-ffmpeg")]
use super::video::VideoWriter;
use super::FrameSink;
#[cfg(feature = "record-ffmpeg")]
use crate::frame::fit_to;

/// Recording sink that opens its file on the first frame.
///
/// The first frame fixes the recording geometry; later frames of another size
/// are resized to it. `finish` finalizes the file; a recorder that never saw a
/// frame leaves no file behind. Encoding needs the `record-ffmpeg` feature.
pub struct LazyRecorder {
    path: PathBuf,
    fps: u32,
    #[cfg(feature = "record-ffmpeg")]
    writer: Option<VideoWriter>,
    frames_written: u64,
}

impl LazyRecorder {
    pub fn new(path: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            path: path.into(),
            fps,
            #[cfg(feature = "record-ffmpeg")]
            writer: None,
            frames_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    #[cfg(feature = "record-ffmpeg")]
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    #[cfg(not(feature = "record-ffmpeg"))]
    pub fn is_open(&self) -> bool {
        false
    }

    /// Frames written since the recording was opened.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameSink for LazyRecorder {
    fn name(&self) -> &str {
        "recorder"
    }

    #[cfg(feature = "record-ffmpeg")]
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let writer = match &mut self.writer {
            Some(writer) => writer,
            None => {
                let (width, height) = frame.dimensions();
                log::info!(
                    "recorder: opening {} ({}x{} @ {} fps, MJPG)",
                    self.path.display(),
                    width,
                    height,
                    self.fps
                );
                self.writer
                    .insert(VideoWriter::create(&self.path, width, height, self.fps)?)
            }
        };
        let (width, height) = writer.dimensions();
        if frame.dimensions() == (width, height) {
            writer.write_frame(frame)?;
        } else {
            writer.write_frame(&fit_to(frame, width, height))?;
        }
        self.frames_written += 1;
        Ok(())
    }

    #[cfg(not(feature = "record-ffmpeg"))]
    fn write(&mut self, _frame: &RgbImage) -> Result<()> {
        Err(anyhow!(
            "recording to {} requires the record-ffmpeg feature",
            self.path.display()
        ))
    }

    #[cfg(feature = "record-ffmpeg")]
    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let frames = std::mem::take(&mut self.frames_written);
            writer.finish()?;
            log::info!(
                "recorder: finalized {} ({} frames)",
                self.path.display(),
                frames
            );
        }
        Ok(())
    }

    #[cfg(not(feature = "record-ffmpeg"))]
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_without_frames_creates_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("never.avi");
        let mut recorder = LazyRecorder::new(&path, 25);
        recorder.finish()?;
        recorder.finish()?;
        assert!(!path.exists());
        Ok(())
    }

    #[cfg(not(feature = "record-ffmpeg"))]
    #[test]
    fn writing_without_an_encoder_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.avi");
        let mut recorder = LazyRecorder::new(&path, 25);

        let err = recorder.write(&RgbImage::new(40, 30)).unwrap_err();
        assert!(err.to_string().contains("record-ffmpeg"));
        assert!(!recorder.is_open());
        assert!(!path.exists());
        Ok(())
    }

    #[cfg(feature = "record-ffmpeg")]
    #[test]
    fn opens_on_first_frame_and_fits_later_ones() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.avi");
        let mut recorder = LazyRecorder::new(&path, 25);
        assert!(!recorder.is_open());
        assert!(!path.exists());

        recorder.write(&RgbImage::new(40, 30))?;
        assert!(recorder.is_open());
        recorder.write(&RgbImage::new(80, 60))?;
        assert_eq!(recorder.frames_written(), 2);
        recorder.finish()?;
        assert!(!recorder.is_open());

        let bytes = std::fs::read(&path)?;
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");
        Ok(())
    }

    #[cfg(feature = "record-ffmpeg")]
    #[test]
    fn frame_count_restarts_after_finish() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.avi");
        let mut recorder = LazyRecorder::new(&path, 25);

        recorder.write(&RgbImage::new(40, 30))?;
        recorder.write(&RgbImage::new(40, 30))?;
        recorder.finish()?;
        assert_eq!(recorder.frames_written(), 0);

        recorder.write(&RgbImage::new(40, 30))?;
        assert_eq!(recorder.frames_written(), 1);
        recorder.finish()?;
        Ok(())
    }
}
