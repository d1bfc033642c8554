//! Local file frame source.
//!
//! `FileSource` reads frames from the local filesystem:
//! - a single image file (one frame)
//! - a directory of images, replayed in file-name order
//! - a video file, decoded with FFmpeg (feature: ingest-ffmpeg)
//!
//! Remote URLs are rejected.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

#[cfg(feature = "ingest-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::FrameSource;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Local file frame source.
pub struct FileSource {
    path: String,
    backend: FileBackend,
}

enum FileBackend {
    Images(ImageSequence),
    #[cfg(feature = "ingest-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes): {}",
                path
            ));
        }
        let local = Path::new(path);
        let backend = if local.is_dir() {
            FileBackend::Images(ImageSequence::from_dir(local)?)
        } else if is_image_path(local) {
            FileBackend::Images(ImageSequence::single(local)?)
        } else {
            video_backend(path)?
        };
        Ok(Self {
            path: path.to_string(),
            backend,
        })
    }
}

#[cfg(feature = "ingest-ffmpeg")]
fn video_backend(path: &str) -> Result<FileBackend> {
    Ok(FileBackend::Ffmpeg(FfmpegFileSource::new(path)?))
}

#[cfg(not(feature = "ingest-ffmpeg"))]
fn video_backend(path: &str) -> Result<FileBackend> {
    Err(anyhow!(
        "video input '{}' requires the ingest-ffmpeg feature",
        path
    ))
}

impl FrameSource for FileSource {
    fn name(&self) -> &str {
        &self.path
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Images(source) => {
                log::info!(
                    "FileSource: connected to {} ({} images)",
                    self.path,
                    source.paths.len()
                );
                Ok(())
            }
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match &mut self.backend {
            FileBackend::Images(source) => source.next_frame(),
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn frames_captured(&self) -> u64 {
        match &self.backend {
            FileBackend::Images(source) => source.position as u64,
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_captured(),
        }
    }
}

struct ImageSequence {
    paths: Vec<PathBuf>,
    position: usize,
}

impl ImageSequence {
    fn single(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("image file {} does not exist", path.display()));
        }
        Ok(Self {
            paths: vec![path.to_path_buf()],
            position: 0,
        })
    }

    fn from_dir(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to read image directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_image_path(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(anyhow!("no images found in {}", dir.display()));
        }
        paths.sort();
        Ok(Self { paths, position: 0 })
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.paths.get(self.position) else {
            return Ok(None);
        };
        let frame = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?
            .to_rgb8();
        self.position += 1;
        Ok(Some(frame))
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_local_file_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("://")
}
