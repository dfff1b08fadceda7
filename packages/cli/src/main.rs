#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the severity scoring engine.
//!
//! Builds or loads the amenity index, scores incident files and prints
//! the `{ "count": n, "results": [...] }` report as JSON.
//!
//! Logging goes through `indicatif-log-bridge` (see
//! [`progress::init_logger`]) so log lines and the scoring progress bar
//! never fight for the terminal.

mod input;
mod progress;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use verifix_amenities::demo::{demo_incidents, demo_points, write_demo_layers};
use verifix_amenities::load_layers;
use verifix_scoring::{ScoringConfig, ScoringError, SeverityEngine, build_index_with, load_index};
use verifix_severity_models::{LatLon, ScoreReport};

use crate::progress::IncidentBar;

#[derive(Parser)]
#[command(name = "verifix", about = "Proximity-based severity scoring for civic incidents")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score incidents against the amenity layers
    Score {
        /// JSON file with an array of incidents (or `{"incidents": [...]}`)
        #[arg(long)]
        incidents: Option<PathBuf>,
        /// Use the built-in sample amenities (and sample incidents when
        /// `--incidents` is not given)
        #[arg(long)]
        demo: bool,
        /// Load a persisted index instead of reading the layers
        #[arg(long)]
        index: Option<PathBuf>,
        /// Score across all cores
        #[arg(long)]
        parallel: bool,
        /// Write the report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Build the amenity index and persist it
    BuildIndex {
        /// Destination file (defaults to `[index] path` / `VERIFIX_INDEX_PATH`)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Index the built-in sample amenities
        #[arg(long)]
        demo: bool,
    },
    /// Show the header and per-category contents of a persisted index
    InspectIndex {
        /// Index file (defaults to `[index] path` / `VERIFIX_INDEX_PATH`)
        path: Option<PathBuf>,
    },
    /// Write the sample amenity layers as `GeoJSON` files
    DemoLayers {
        #[arg(long, default_value = "demo_layers")]
        dir: PathBuf,
    },
}

#[allow(clippy::too_many_lines)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = progress::init_logger();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Score {
            incidents,
            demo,
            index,
            parallel,
            output,
        } => {
            let (incidents, source) = match (incidents, demo) {
                (Some(path), _) => (input::read_incidents(&path)?, path.display().to_string()),
                (None, true) => (demo_incidents(), "demo incidents".to_string()),
                (None, false) => return Err("pass --incidents <file> or --demo".into()),
            };
            let bar = IncidentBar::new(&multi, &source);

            let index = match index {
                Some(path) => load_index(&path, true, Some(&config.index.backend()))?,
                None => build_index_with(&category_points(&config, demo), &config.index),
            };
            let engine = SeverityEngine::new(index, config.params.clone())?;

            let outcome = engine.score_batch_detailed(&incidents, None, parallel, &bar)?;
            if !outcome.skipped.is_empty() {
                log::warn!(
                    "{} incidents had no usable coordinates (positions {:?})",
                    outcome.skipped.len(),
                    outcome.skipped_positions()
                );
            }

            let report = ScoreReport::from(outcome.results);
            write_report(&report, output.as_deref())?;
        }
        Commands::BuildIndex { out, demo } => {
            let path = out.unwrap_or_else(|| config.index.path.clone());
            let index = build_index_with(&category_points(&config, demo), &config.index);
            for stats in index.stats() {
                log::info!(
                    "  {:<12} {:>6} points ({}{})",
                    stats.category,
                    stats.points,
                    stats.mode,
                    if stats.degraded { ", degraded" } else { "" }
                );
            }

            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let report = verifix_spatial::save(&index, &path)?;
            if let Some(reason) = &report.fallback_reason {
                log::warn!("Wrote raw-only index: {reason}");
            }
            println!(
                "Saved {} index to {} ({} bytes)",
                report.format,
                path.display(),
                report.bytes
            );
        }
        Commands::InspectIndex { path } => {
            let path = path.unwrap_or_else(|| config.index.path.clone());
            inspect(&path)?;
        }
        Commands::DemoLayers { dir } => {
            let layers = write_demo_layers(&dir)?;
            for (category, path) in layers.iter() {
                println!("{category:<12} {}", path.display());
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ScoringConfig, ScoringError> {
    let config = match path {
        Some(path) => ScoringConfig::load(path)?,
        None => ScoringConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn category_points(config: &ScoringConfig, demo: bool) -> BTreeMap<String, Vec<LatLon>> {
    if demo {
        demo_points()
    } else {
        load_layers(&config.resolved_layers(|key| std::env::var(key).ok()))
    }
}

fn write_report(
    report: &ScoreReport,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            log::info!("Wrote {} results to {}", report.count, path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn inspect(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let info = verifix_spatial::inspect(path)?;
    println!("{}", path.display());
    println!("  version: {}", info.version);
    println!("  type:    {}", info.format);
    println!();

    let index = verifix_spatial::load(path, false, None)?;
    let modes: BTreeMap<String, String> = index
        .stats()
        .into_iter()
        .map(|s| {
            let mode = if s.degraded {
                format!("{} (degraded)", s.mode)
            } else {
                s.mode.to_string()
            };
            (s.category, mode)
        })
        .collect();

    println!("{:<12} {:>8}  MODE", "CATEGORY", "POINTS");
    println!("{}", "-".repeat(40));
    for (category, points) in &info.categories {
        let mode = modes.get(category).map_or("-", String::as_str);
        println!("{category:<12} {points:>8}  {mode}");
    }
    Ok(())
}
