use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the card pipeline.
///
/// Geometric edge cases never show up here; they are resolved inside the
/// stage that meets them and reported as [`PipelineWarning`]s instead.
#[derive(Debug, Error)]
pub enum CardError {
    #[error("failed to load image {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("input is not a regular file: {0:?}")]
    NotAFile(PathBuf),

    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("failed to read configuration file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to create output directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write artifact {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl CardError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// True for failures that only affect the input that raised them.
    pub fn is_per_input(&self) -> bool {
        matches!(self, CardError::Load { .. } | CardError::NotAFile(_))
    }
}

pub type Result<T> = std::result::Result<T, CardError>;

/// A crop window in raster coordinates; the origin may be negative before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for CropWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Non-fatal conditions attached to a [`crate::PipelineResult`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineWarning {
    #[error("no rectangles found ({polygons} polygons considered)")]
    NoRectanglesFound { polygons: usize },

    #[error("card {rank}: crop {requested} clamped to {clamped}")]
    CropClamped {
        rank: usize,
        requested: CropWindow,
        clamped: CropWindow,
    },

    #[error("card {rank}: crop window {requested} lies outside the image, skipped")]
    EmptyCrop { rank: usize, requested: CropWindow },

    #[error("card {rank}: rotation matrix not invertible, cropped without deskew")]
    RotationUnavailable { rank: usize },

    #[error("card {rank}: whole crop matches the background, trim skipped")]
    DegenerateTrim { rank: usize },
}

impl PipelineWarning {
    /// Rank of the card the warning belongs to, if any.
    pub fn rank(&self) -> Option<usize> {
        match self {
            PipelineWarning::NoRectanglesFound { .. } => None,
            PipelineWarning::CropClamped { rank, .. }
            | PipelineWarning::EmptyCrop { rank, .. }
            | PipelineWarning::RotationUnavailable { rank }
            | PipelineWarning::DegenerateTrim { rank } => Some(*rank),
        }
    }
}
