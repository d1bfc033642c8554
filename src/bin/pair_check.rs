//! pair_check - run the distance evaluator on a list of centroids
//!
//! Reads `[[x, y], ...]` JSON from a file or stdin and prints the flagged
//! indices as JSON.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;

use distancing_monitor::{evaluate, ViolationSet};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Minimum allowed distance between centroids, in pixels.
    #[arg(long, default_value_t = 50.0)]
    min_distance: f32,
    /// JSON file with centroids (reads stdin when omitted or "-").
    path: Option<PathBuf>,
}

#[derive(Serialize)]
struct PairCheckOutput {
    people: usize,
    violations: ViolationSet,
    count: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if !(args.min_distance.is_finite() && args.min_distance > 0.0) {
        return Err(anyhow!("--min-distance must be a positive number of pixels"));
    }

    let raw = match &args.path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        _ => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("failed to read stdin")?;
            raw
        }
    };
    let centroids: Vec<(f32, f32)> =
        serde_json::from_str(&raw).context("expected centroids as [[x, y], ...]")?;

    let violations = evaluate(&centroids, args.min_distance);
    log::debug!("{} centroids, {} flagged", centroids.len(), violations.len());
    let output = PairCheckOutput {
        people: centroids.len(),
        count: violations.len(),
        violations,
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}
