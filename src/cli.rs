use clap::Parser;
use std::path::PathBuf;

use crate::config::{AspectRange, Orientation, PipelineConfig, Profile, RelaxedShape};
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "cardcrop")]
#[command(
    version,
    about = "Detect, deskew, crop and trim the cards in photos of cards on a plain background"
)]
pub struct Cli {
    /// Input images
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output directory [default: processed/<timestamp>]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Parameter preset for the photo resolution
    #[arg(short, long, value_enum)]
    pub profile: Option<Profile>,

    /// Maximum number of cards kept per image
    #[arg(short = 'n', long)]
    pub max_rectangles: Option<usize>,

    /// Minimum contour area in pixels
    #[arg(short = 'a', long)]
    pub min_area: Option<f64>,

    /// Write contour overlays and intermediate rasters
    #[arg(short = 'c', long)]
    pub contours: bool,

    /// Orientation of the cropped cards
    #[arg(long, value_enum)]
    pub orientation: Option<Orientation>,

    /// Trim tolerance as a fraction of full scale (e.g. 0.35)
    #[arg(long)]
    pub fuzz: Option<f64>,

    /// Accepted short/long side ratio (e.g. "0.70:0.73")
    #[arg(long, value_parser = parse_range)]
    pub aspect: Option<AspectRange>,

    /// Accept near-rectangular polygons: minimum extent and aspect (e.g. "0.9:0.5")
    #[arg(long, value_parser = parse_relaxed)]
    pub relaxed: Option<RelaxedShape>,

    /// Only trim the uniform border of each input, writing <stem>_trimmed.<ext>
    #[arg(long)]
    pub trim_only: bool,

    /// Worker threads [default: one per core]
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Show debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn output_root(&self, config: &PipelineConfig) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
            config.output_root.join(stamp.to_string())
        })
    }

    /// Configuration file (or profile preset) with the flags applied on top.
    pub fn to_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::for_profile(self.profile.unwrap_or_default()),
        };

        if let (Some(profile), Some(_)) = (self.profile, &self.config) {
            config.min_area = profile.min_area();
            config.edges.dilate_iterations = profile.dilate_iterations();
            if let Some(range) = profile.aspect_ratio() {
                config.shape.aspect_ratio = Some(range);
            }
        }
        if let Some(n) = self.max_rectangles {
            config.max_rectangles = n;
        }
        if let Some(area) = self.min_area {
            config.min_area = area;
        }
        if self.contours {
            config.draw_contours = true;
        }
        if let Some(orientation) = self.orientation {
            config.normalize.orientation = orientation;
        }
        if let Some(fuzz) = self.fuzz {
            config.trim.fuzz = fuzz;
        }
        if let Some(range) = self.aspect {
            config.shape.aspect_ratio = Some(range);
        }
        if let Some(relaxed) = self.relaxed {
            config.shape.relaxed = Some(relaxed);
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_pair(s: &str) -> std::result::Result<(f64, f64), String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid range format '{}', expected A:B", s));
    }

    let first: f64 = parts[0]
        .parse()
        .map_err(|_| format!("Invalid value: {}", parts[0]))?;
    let second: f64 = parts[1]
        .parse()
        .map_err(|_| format!("Invalid value: {}", parts[1]))?;

    if first <= 0.0 || second <= 0.0 || first > 1.0 || second > 1.0 {
        return Err("Values must lie in (0, 1]".to_string());
    }

    Ok((first, second))
}

fn parse_range(s: &str) -> std::result::Result<AspectRange, String> {
    let (min, max) = parse_pair(s)?;
    if min > max {
        return Err(format!("Minimum {} exceeds maximum {}", min, max));
    }
    Ok(AspectRange::new(min, max))
}

fn parse_relaxed(s: &str) -> std::result::Result<RelaxedShape, String> {
    let (min_extent, min_aspect) = parse_pair(s)?;
    Ok(RelaxedShape {
        min_extent,
        min_aspect,
    })
}
