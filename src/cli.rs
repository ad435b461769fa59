use clap::Parser;
use std::path::PathBuf;

use crate::config::AlignConfig;
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "page-align")]
#[command(version, about = "Estimate page skew and align recognized text lines for searchable overlays")]
pub struct Cli {
    /// Page image paths, in document order
    #[arg(required = true)]
    pub pages: Vec<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output JSON path [default: stdout]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Angle search window in degrees (e.g., "-8:8")
    #[arg(short, long, value_parser = parse_range, allow_hyphen_values = true)]
    pub range: Option<(f64, f64)>,

    /// Number of horizontal bands for local angle sampling
    #[arg(short, long)]
    pub bands: Option<usize>,

    /// Per-page time budget for the angle search in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Write intermediate masks as PNG files into this directory
    #[arg(long)]
    pub debug_dir: Option<PathBuf>,

    /// Show detection details
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    /// Configuration from the file (or defaults) with command-line overrides
    pub fn load_config(&self) -> Result<AlignConfig> {
        let mut config = match &self.config {
            Some(path) => AlignConfig::load(path)?,
            None => AlignConfig::default(),
        };

        if let Some((min, max)) = self.range {
            config.skew.search.min_degrees = min;
            config.skew.search.max_degrees = max;
        }
        if let Some(bands) = self.bands {
            config.skew.band_count = bands;
            config.local.band_count = bands;
        }
        if self.timeout_ms.is_some() {
            config.page_timeout_ms = self.timeout_ms;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_range(s: &str) -> std::result::Result<(f64, f64), String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid range format '{}', expected MIN:MAX", s));
    }

    let min: f64 = parts[0]
        .trim()
        .parse()
        .map_err(|_| format!("Invalid minimum angle: {}", parts[0]))?;
    let max: f64 = parts[1]
        .trim()
        .parse()
        .map_err(|_| format!("Invalid maximum angle: {}", parts[1]))?;

    if min > max {
        return Err("Range minimum must not exceed maximum".to_string());
    }

    Ok((min, max))
}
