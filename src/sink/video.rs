//! MJPEG-in-AVI encoding using FFmpeg.
//!
//! Packets are muxed as soon as the encoder emits them, so a recording that is
//! cut short still holds every frame written before the failure.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::Rational;
use image::RgbImage;

const CONTAINER: &str = "avi";
const ENCODED_FORMAT: Pixel = Pixel::YUVJ420P;

pub struct VideoWriter {
    path: PathBuf,
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl VideoWriter {
    /// Create `path` and write the container header for a `width`x`height`
    /// MJPEG stream at `fps`.
    pub fn create(path: &Path, width: u32, height: u32, fps: u32) -> Result<Self> {
        if width == 0 || height == 0 || fps == 0 {
            return Err(anyhow!(
                "cannot record a {}x{} stream at {} fps",
                width,
                height,
                fps
            ));
        }
        let rate = i32::try_from(fps).context("recording fps out of range")?;
        ffmpeg::init().context("initialize ffmpeg")?;

        let mut output = ffmpeg::format::output_as(&path, CONTAINER)
            .with_context(|| format!("failed to create recording {}", path.display()))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MJPEG)
            .ok_or_else(|| anyhow!("ffmpeg was built without an MJPEG encoder"))?;

        let encoder_time_base = Rational::new(1, rate);
        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create MJPEG encoder")?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(ENCODED_FORMAT);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(Rational::new(rate, 1)));
        encoder.set_bit_rate(width as usize * height as usize * fps as usize * 2);
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec).context("open MJPEG encoder")?;

        let stream_index = {
            let mut stream = output.add_stream(codec).context("add video stream")?;
            stream.set_parameters(&encoder);
            stream.set_time_base(encoder_time_base);
            stream.index()
        };
        output
            .write_header()
            .with_context(|| format!("failed to write header of {}", path.display()))?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| anyhow!("recording lost its video stream"))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            Pixel::RGB24,
            width,
            height,
            ENCODED_FORMAT,
            width,
            height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            path: path.to_path_buf(),
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            width,
            height,
            frames_written: 0,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(anyhow!(
                "frame is {}x{}, recording is {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            ));
        }

        let rgb = self.to_video_frame(frame)?;
        let mut encoded = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut encoded)
            .context("convert frame for encoding")?;
        encoded.set_pts(Some(self.frames_written as i64));

        self.encoder
            .send_frame(&encoded)
            .context("send frame to MJPEG encoder")?;
        self.write_packets()?;
        self.frames_written += 1;
        Ok(())
    }

    /// Flush the encoder and write the container trailer.
    pub fn finish(mut self) -> Result<()> {
        self.encoder.send_eof().context("flush MJPEG encoder")?;
        self.write_packets()?;
        self.output
            .write_trailer()
            .with_context(|| format!("failed to finalize {}", self.path.display()))?;
        Ok(())
    }

    fn to_video_frame(&self, frame: &RgbImage) -> Result<ffmpeg::frame::Video> {
        let mut video = ffmpeg::frame::Video::new(Pixel::RGB24, self.width, self.height);
        let stride = video.stride(0);
        let row_bytes = self.width as usize * 3;
        let data = video.data_mut(0);
        for (y, row) in frame.as_raw().chunks_exact(row_bytes).enumerate() {
            let start = y * stride;
            data.get_mut(start..start + row_bytes)
                .ok_or_else(|| anyhow!("ffmpeg frame buffer smaller than the image"))?
                .copy_from_slice(row);
        }
        Ok(video)
    }

    fn write_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .with_context(|| format!("failed to write to {}", self.path.display()))?;
        }
        Ok(())
    }
}
