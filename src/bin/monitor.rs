//! monitor - live distancing monitor
//!
//! 1. Loads configuration (file, environment, then flags)
//! 2. Resolves the target class and opens the detector
//! 3. Runs the pipeline until the source ends or Ctrl-C
//! 4. Finalizes the recording and prints the run summary

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use distancing_monitor::sink::recording_supported;
use distancing_monitor::{
    open_source, Annotator, Driver, LazyRecorder, MonitorConfig, PipelineSettings,
    PreviewDisplay, StopSignal,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file (TOML or JSON).
    #[arg(long, env = "DISTANCING_CONFIG")]
    config: Option<PathBuf>,
    /// Input source: stub:// URL, image, image directory or video file.
    #[arg(short, long)]
    input: Option<String>,
    /// Output AVI file for the annotated stream.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Whether to show the preview (1) or not (0).
    #[arg(short, long, value_name = "0|1", value_parser = clap::value_parser!(u8).range(0..=1))]
    display: Option<u8>,
    /// Minimum allowed distance between people, in working-frame pixels.
    #[arg(long)]
    min_distance: Option<f32>,
    /// Detector backend (stub|tract).
    #[arg(long)]
    backend: Option<String>,
    /// Capture region width, from the top-left corner.
    #[arg(long, requires = "region_height")]
    region_width: Option<u32>,
    /// Capture region height, from the top-left corner.
    #[arg(long, requires = "region_width")]
    region_height: Option<u32>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(path) = &args.config {
        std::env::set_var("DISTANCING_CONFIG", path);
    }
    let mut config = MonitorConfig::load()?;
    apply_args(&mut config, &args);
    config.validate()?;
    config.detector.check_model_files()?;
    if config.output.path.is_some() && !recording_supported() {
        return Err(anyhow!(
            "recording output needs a build with the record-ffmpeg feature"
        ));
    }

    let target_class = config.resolve_target_class()?;
    let detector = config.detector.open_backend(target_class)?;
    let source = open_source(&config.input.url, config.capture_region()?)?;

    let annotator = Annotator::default().with_font_search(config.display.font_path.as_deref())?;
    let settings = PipelineSettings::new(config.min_distance, target_class)
        .with_working_width(config.input.working_width);

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        handler_stop.trigger();
    })
    .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;

    let mut driver = Driver::new(settings, source, detector)
        .with_annotator(annotator)
        .with_stop_signal(stop);
    if config.display.enabled {
        driver = driver.with_display(Box::new(PreviewDisplay::new(
            config.display.preview_path.clone(),
        )));
    }
    if let Some(path) = &config.output.path {
        driver = driver.with_recorder(Box::new(LazyRecorder::new(path.clone(), config.output.fps)));
    }
    if let Some(frames) = args.max_frames {
        driver = driver.with_frame_limit(frames);
    }

    log::info!("monitor running; press Ctrl-C to stop");
    let report = driver.run()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn apply_args(config: &mut MonitorConfig, args: &Args) {
    if let Some(input) = &args.input {
        config.input.url = input.clone();
    }
    if let Some(output) = &args.output {
        config.output.path = Some(output.clone());
    }
    if let Some(display) = args.display {
        config.display.enabled = display == 1;
    }
    if let Some(distance) = args.min_distance {
        config.min_distance = distance;
    }
    if let Some(backend) = &args.backend {
        config.detector.backend = backend.trim().to_lowercase();
    }
    if args.region_width.is_some() || args.region_height.is_some() {
        config.input.region_width = args.region_width;
        config.input.region_height = args.region_height;
    }
}
