//! Synthetic frame source for `stub://` URLs.
//!
//! Query parameters control the stream: `stub://camera?width=640&height=480&frames=100`.
//! Without `frames` the stream never ends.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use url::Url;

use super::FrameSource;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub frame_limit: Option<u64>,
}

impl SyntheticConfig {
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).context("parse stub url")?;
        if parsed.scheme() != "stub" {
            return Err(anyhow!(
                "unsupported synthetic scheme '{}'; expected stub",
                parsed.scheme()
            ));
        }
        let mut config = Self {
            url: url.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_limit: None,
        };
        for (key, value) in parsed.query_pairs() {
            let number: u64 = value
                .parse()
                .map_err(|_| anyhow!("stub:// parameter '{}' must be an integer", key))?;
            match &*key {
                "width" => config.width = dimension(&key, number)?,
                "height" => config.height = dimension(&key, number)?,
                "frames" => config.frame_limit = Some(number),
                other => return Err(anyhow!("unknown stub:// parameter '{}'", other)),
            }
        }
        Ok(config)
    }
}

fn dimension(key: &str, value: u64) -> Result<u32> {
    if value == 0 || value > u32::MAX as u64 {
        return Err(anyhow!("stub:// {} out of range: {}", key, value));
    }
    Ok(value as u32)
}

/// Generates a slowly shifting gradient.
pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    pub fn from_url(url: &str) -> Result<Self> {
        Ok(Self::new(SyntheticConfig::parse(url)?))
    }

    fn generate(&self) -> RgbImage {
        let shift = (self.frame_count % 256) as u32;
        RgbImage::from_fn(self.config.width, self.config.height, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift) % 256) as u8,
                ((x + y) % 256) as u8,
            ])
        })
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.url,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        let frame = self.generate();
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}
