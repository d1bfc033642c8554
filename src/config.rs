use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{DetectorBackend, Labels, StubBackend};
use crate::frame::{CaptureRegion, DEFAULT_WORKING_WIDTH};

const DEFAULT_MIN_DISTANCE: f32 = 50.0;
const DEFAULT_TARGET_CLASS: &str = "person";
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_MODEL_DIR: &str = "yolo-coco";
const DEFAULT_WEIGHTS: &str = "yolov8n.onnx";
const DEFAULT_LABELS: &str = "coco.names";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.3;
const DEFAULT_NMS_THRESHOLD: f32 = 0.3;
const DEFAULT_INPUT_URL: &str = "stub://camera";
const DEFAULT_PREVIEW_PATH: &str = "monitor_preview.jpg";
const DEFAULT_RECORD_FPS: u32 = 25;

/// Detector backends selectable by name.
pub const BACKENDS: &[&str] = &["stub", "tract"];

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    min_distance: Option<f32>,
    target_class: Option<String>,
    detector: Option<DetectorConfigFile>,
    input: Option<InputConfigFile>,
    display: Option<DisplayConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_dir: Option<PathBuf>,
    weights: Option<String>,
    labels: Option<String>,
    config: Option<String>,
    input_size: Option<u32>,
    min_confidence: Option<f32>,
    nms_threshold: Option<f32>,
    use_gpu: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct InputConfigFile {
    url: Option<String>,
    working_width: Option<u32>,
    region_width: Option<u32>,
    region_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    enabled: Option<bool>,
    preview_path: Option<PathBuf>,
    font_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    path: Option<PathBuf>,
    fps: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Minimum allowed centroid distance in pixels.
    pub min_distance: f32,
    /// Label of the class to monitor, resolved against the label list at startup.
    pub target_class: String,
    pub detector: DetectorSettings,
    pub input: InputSettings,
    pub display: DisplaySettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_dir: PathBuf,
    pub weights: String,
    pub labels: String,
    /// Optional model configuration file, for detectors that ship one next to the weights.
    pub config: Option<String>,
    pub input_size: u32,
    pub min_confidence: f32,
    pub nms_threshold: f32,
    pub use_gpu: bool,
}

#[derive(Debug, Clone)]
pub struct InputSettings {
    pub url: String,
    pub working_width: u32,
    pub region_width: Option<u32>,
    pub region_height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub enabled: bool,
    pub preview_path: PathBuf,
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub path: Option<PathBuf>,
    pub fps: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        // An empty file yields only defaults and cannot fail.
        Self::from_file(MonitorConfigFile::default())
    }
}

impl MonitorConfig {
    /// Defaults, then the file named by `DISTANCING_CONFIG`, then `DISTANCING_*`
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DISTANCING_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let detector = file.detector.unwrap_or_default();
        let input = file.input.unwrap_or_default();
        let display = file.display.unwrap_or_default();
        let output = file.output.unwrap_or_default();
        Self {
            min_distance: file.min_distance.unwrap_or(DEFAULT_MIN_DISTANCE),
            target_class: file
                .target_class
                .unwrap_or_else(|| DEFAULT_TARGET_CLASS.to_string()),
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_dir: detector
                    .model_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
                weights: detector
                    .weights
                    .unwrap_or_else(|| DEFAULT_WEIGHTS.to_string()),
                labels: detector.labels.unwrap_or_else(|| DEFAULT_LABELS.to_string()),
                config: detector.config,
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                min_confidence: detector.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
                nms_threshold: detector.nms_threshold.unwrap_or(DEFAULT_NMS_THRESHOLD),
                use_gpu: detector.use_gpu.unwrap_or(false),
            },
            input: InputSettings {
                url: input.url.unwrap_or_else(|| DEFAULT_INPUT_URL.to_string()),
                working_width: input.working_width.unwrap_or(DEFAULT_WORKING_WIDTH),
                region_width: input.region_width,
                region_height: input.region_height,
            },
            display: DisplaySettings {
                enabled: display.enabled.unwrap_or(true),
                preview_path: display
                    .preview_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_PREVIEW_PATH)),
                font_path: display.font_path,
            },
            output: OutputSettings {
                path: output.path,
                fps: output.fps.unwrap_or(DEFAULT_RECORD_FPS),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(distance) = std::env::var("DISTANCING_MIN_DISTANCE") {
            self.min_distance = distance
                .trim()
                .parse()
                .map_err(|_| anyhow!("DISTANCING_MIN_DISTANCE must be a number of pixels"))?;
        }
        if let Ok(url) = std::env::var("DISTANCING_INPUT") {
            if !url.trim().is_empty() {
                self.input.url = url;
            }
        }
        if let Ok(path) = std::env::var("DISTANCING_OUTPUT") {
            if !path.trim().is_empty() {
                self.output.path = Some(PathBuf::from(path));
            }
        }
        if let Ok(display) = std::env::var("DISTANCING_DISPLAY") {
            self.display.enabled = parse_flag(&display)
                .ok_or_else(|| anyhow!("DISTANCING_DISPLAY must be 0 or 1"))?;
        }
        if let Ok(dir) = std::env::var("DISTANCING_MODEL_DIR") {
            if !dir.trim().is_empty() {
                self.detector.model_dir = PathBuf::from(dir);
            }
        }
        if let Ok(backend) = std::env::var("DISTANCING_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_lowercase();
            }
        }
        if let Ok(use_gpu) = std::env::var("DISTANCING_USE_GPU") {
            self.detector.use_gpu = parse_flag(&use_gpu)
                .ok_or_else(|| anyhow!("DISTANCING_USE_GPU must be 0 or 1"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_distance.is_finite() && self.min_distance > 0.0) {
            return Err(anyhow!(
                "min_distance must be a positive number of pixels (got {})",
                self.min_distance
            ));
        }
        if self.target_class.trim().is_empty() {
            return Err(anyhow!("target_class must not be empty"));
        }
        if !BACKENDS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of: {})",
                self.detector.backend,
                BACKENDS.join(", ")
            ));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        for (name, value) in [
            ("min_confidence", self.detector.min_confidence),
            ("nms_threshold", self.detector.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1] (got {})", name, value));
            }
        }
        if self.input.working_width == 0 {
            return Err(anyhow!("working_width must be greater than zero"));
        }
        if self.output.fps == 0 {
            return Err(anyhow!("recording fps must be greater than zero"));
        }
        self.capture_region()?;
        Ok(())
    }

    /// Operator capture region, if one was configured.
    ///
    /// Both dimensions are required together; zero is rejected.
    pub fn capture_region(&self) -> Result<Option<CaptureRegion>> {
        match (self.input.region_width, self.input.region_height) {
            (None, None) => Ok(None),
            (Some(width), Some(height)) => CaptureRegion::new(width, height).map(Some),
            _ => Err(anyhow!(
                "capture region needs both region_width and region_height"
            )),
        }
    }

    /// Index of `target_class` in the model's label list.
    ///
    /// The stub backend has no model; without a label file it monitors class 0.
    pub fn resolve_target_class(&self) -> Result<usize> {
        let labels_path = self.detector.labels_path();
        if self.detector.backend == "stub" && !labels_path.exists() {
            log::info!(
                "no label list at {}; stub detector monitors class 0 as '{}'",
                labels_path.display(),
                self.target_class
            );
            return Ok(0);
        }
        let labels = Labels::from_path(&labels_path)?;
        let index = labels
            .index_of(&self.target_class)
            .with_context(|| format!("in {}", labels_path.display()))?;
        log::info!(
            "monitoring class '{}' (index {} of {} labels)",
            self.target_class,
            index,
            labels.len()
        );
        Ok(index)
    }
}

impl DetectorSettings {
    pub fn weights_path(&self) -> PathBuf {
        self.model_dir.join(&self.weights)
    }

    pub fn labels_path(&self) -> PathBuf {
        self.model_dir.join(&self.labels)
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.as_ref().map(|config| self.model_dir.join(config))
    }

    /// Fail early when the selected backend's model files are missing.
    pub fn check_model_files(&self) -> Result<()> {
        if self.backend == "stub" {
            return Ok(());
        }
        let weights = self.weights_path();
        if !weights.is_file() {
            return Err(anyhow!("model weights not found at {}", weights.display()));
        }
        if let Some(config) = self.config_path() {
            if !config.is_file() {
                return Err(anyhow!("model config not found at {}", config.display()));
            }
        }
        let labels = self.labels_path();
        if !labels.is_file() {
            return Err(anyhow!("label list not found at {}", labels.display()));
        }
        Ok(())
    }

    /// Build the configured detector backend.
    pub fn open_backend(&self, target_class: usize) -> Result<Box<dyn DetectorBackend>> {
        if self.use_gpu {
            log::info!(
                "accelerated inference requested; the {} backend runs on the CPU",
                self.backend
            );
        }
        match self.backend.as_str() {
            "stub" => Ok(Box::new(StubBackend::walkers(target_class))),
            "tract" => self.open_tract(),
            other => Err(anyhow!("unknown detector backend '{}'", other)),
        }
    }

    #[cfg(feature = "backend-tract")]
    fn open_tract(&self) -> Result<Box<dyn DetectorBackend>> {
        let weights = self.weights_path();
        log::info!("loading detector weights from {}", weights.display());
        let backend = crate::detect::TractBackend::new(&weights, self.input_size)?
            .with_min_confidence(self.min_confidence)
            .with_nms_threshold(self.nms_threshold);
        Ok(Box::new(backend))
    }

    #[cfg(not(feature = "backend-tract"))]
    fn open_tract(&self) -> Result<Box<dyn DetectorBackend>> {
        Err(anyhow!(
            "the tract backend requires the backend-tract feature"
        ))
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg: MonitorConfigFile = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
