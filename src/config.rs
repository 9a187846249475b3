use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{CardError, Result};

/// Deployment presets for the parameters that depend on photo resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Small cards in modest-resolution photos.
    #[default]
    Generic,
    /// High-resolution photographs where each card fills a large part of the frame.
    FullFrame,
}

impl Profile {
    pub fn min_area(self) -> f64 {
        match self {
            Profile::Generic => 1_000.0,
            Profile::FullFrame => 500_000.0,
        }
    }

    pub fn dilate_iterations(self) -> u8 {
        match self {
            Profile::Generic => 2,
            Profile::FullFrame => 8,
        }
    }

    /// Gate on `short side / long side`; trading cards measure 63 x 88 mm.
    pub fn aspect_ratio(self) -> Option<AspectRange> {
        match self {
            Profile::Generic => None,
            Profile::FullFrame => Some(AspectRange::new(0.71, 0.72)),
        }
    }
}

/// Orientation every normalized crop is brought into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    /// Longer side vertical.
    #[default]
    Portrait,
    /// Longer side horizontal.
    Landscape,
    /// Keep whatever the deskew produced.
    AsDetected,
}

/// Resampling filter used when a crop has to be rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Resampling {
    Nearest,
    Bilinear,
    #[default]
    Bicubic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Gaussian sigma; 1.1 matches a 5x5 kernel.
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Passes of a 3x3 square dilation closing gaps in card outlines.
    pub dilate_iterations: u8,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            canny_low: 50.0,
            canny_high: 150.0,
            dilate_iterations: Profile::Generic.dilate_iterations(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    /// Contours with a shorter closed perimeter (pixels) are noise.
    pub min_contour_length: f64,
    /// Douglas-Peucker tolerance as a fraction of the perimeter.
    pub approx_epsilon_ratio: f64,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            min_contour_length: 20.0,
            approx_epsilon_ratio: 0.02,
        }
    }
}

/// Accepted range of `short side / long side`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectRange {
    pub min: f64,
    pub max: f64,
}

impl AspectRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, aspect: f64) -> bool {
        aspect >= self.min && aspect <= self.max
    }
}

/// Tolerances for accepting polygons that did not simplify to four vertices.
///
/// No `Default`: the fallback stays off unless both values are given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxedShape {
    /// Minimum `contour area / bounding rectangle area`.
    pub min_extent: f64,
    /// Minimum `short side / long side` of the bounding rectangle.
    pub min_aspect: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    /// Optional gate on the card proportions (trading cards are about 0.714).
    pub aspect_ratio: Option<AspectRange>,
    pub relaxed: Option<RelaxedShape>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Angles within this many degrees of the axes are cropped without rotation.
    pub axis_epsilon_deg: f64,
    pub orientation: Orientation,
    pub resampling: Resampling,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            axis_epsilon_deg: 0.5,
            orientation: Orientation::default(),
            resampling: Resampling::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    /// Colour distance (fraction of full scale) still counted as background.
    pub fuzz: f64,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self { fuzz: 0.35 }
    }
}

/// Everything one pipeline run needs, validated once by [`PipelineConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_rectangles: usize,
    /// Minimum contour area in edge-map pixels.
    pub min_area: f64,
    /// Materialise debug rasters and contour overlays.
    pub draw_contours: bool,
    pub output_root: PathBuf,
    pub edges: EdgeConfig,
    pub contours: ContourConfig,
    pub shape: ShapeConfig,
    pub normalize: NormalizeConfig,
    pub trim: TrimConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_profile(Profile::Generic)
    }
}

impl PipelineConfig {
    pub fn for_profile(profile: Profile) -> Self {
        Self {
            max_rectangles: 20,
            min_area: profile.min_area(),
            draw_contours: false,
            output_root: PathBuf::from("processed"),
            edges: EdgeConfig {
                dilate_iterations: profile.dilate_iterations(),
                ..EdgeConfig::default()
            },
            contours: ContourConfig::default(),
            shape: ShapeConfig {
                aspect_ratio: profile.aspect_ratio(),
                relaxed: None,
            },
            normalize: NormalizeConfig::default(),
            trim: TrimConfig::default(),
        }
    }

    /// Load a configuration from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CardError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CardError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Distance from the outer contour of a dilated edge band to the card edge
    /// it surrounds, for an edge running along one of the image axes.
    pub fn edge_inset(&self) -> f64 {
        f64::from(self.edges.dilate_iterations) + 0.5
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_rectangles == 0 {
            return Err(CardError::invalid("max_rectangles", "must be at least 1"));
        }
        if !(self.min_area.is_finite() && self.min_area > 0.0) {
            return Err(CardError::invalid(
                "min_area",
                format!("must be a positive number, got {}", self.min_area),
            ));
        }

        let edges = &self.edges;
        if !(edges.blur_sigma.is_finite() && edges.blur_sigma > 0.0) {
            return Err(CardError::invalid("edges.blur_sigma", "must be positive"));
        }
        if !(edges.canny_low >= 0.0 && edges.canny_low <= edges.canny_high) {
            return Err(CardError::invalid(
                "edges.canny_low",
                format!(
                    "must lie in [0, canny_high], got {} / {}",
                    edges.canny_low, edges.canny_high
                ),
            ));
        }

        let contours = &self.contours;
        if !(contours.min_contour_length.is_finite() && contours.min_contour_length >= 0.0) {
            return Err(CardError::invalid(
                "contours.min_contour_length",
                "must be a non-negative number",
            ));
        }
        if !(contours.approx_epsilon_ratio > 0.0 && contours.approx_epsilon_ratio < 0.5) {
            return Err(CardError::invalid(
                "contours.approx_epsilon_ratio",
                format!("must lie in (0, 0.5), got {}", contours.approx_epsilon_ratio),
            ));
        }

        if let Some(range) = self.shape.aspect_ratio {
            if !(range.min > 0.0 && range.min <= range.max && range.max <= 1.0) {
                return Err(CardError::invalid(
                    "shape.aspect_ratio",
                    format!("needs 0 < min <= max <= 1, got {}:{}", range.min, range.max),
                ));
            }
        }
        if let Some(relaxed) = self.shape.relaxed {
            if !(relaxed.min_extent > 0.0 && relaxed.min_extent <= 1.0) {
                return Err(CardError::invalid(
                    "shape.relaxed.min_extent",
                    format!("must lie in (0, 1], got {}", relaxed.min_extent),
                ));
            }
            if !(relaxed.min_aspect > 0.0 && relaxed.min_aspect <= 1.0) {
                return Err(CardError::invalid(
                    "shape.relaxed.min_aspect",
                    format!("must lie in (0, 1], got {}", relaxed.min_aspect),
                ));
            }
        }

        let eps = self.normalize.axis_epsilon_deg;
        if !(eps >= 0.0 && eps < 45.0) {
            return Err(CardError::invalid(
                "normalize.axis_epsilon_deg",
                format!("must lie in [0, 45), got {}", eps),
            ));
        }

        if !(self.trim.fuzz >= 0.0 && self.trim.fuzz <= 1.0) {
            return Err(CardError::invalid(
                "trim.fuzz",
                format!("must lie in [0, 1], got {}", self.trim.fuzz),
            ));
        }

        Ok(())
    }
}
