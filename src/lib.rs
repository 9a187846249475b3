pub mod backend;
pub mod cli;
pub mod config;
pub mod contours;
pub mod detection;
pub mod edges;
pub mod error;
pub mod geometry;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod transform;
pub mod trim;

pub use backend::{GeometryBackend, ImageprocBackend};
pub use cli::Cli;
pub use config::{
    AspectRange, Orientation, PipelineConfig, Profile, RelaxedShape, Resampling,
};
pub use contours::{Contour, ContourExtractor, PolygonCandidate};
pub use detection::{Acceptance, RectangleCandidate, RectangleFilter, RejectionCounts};
pub use edges::{EdgeMapBuilder, EdgeMaps};
pub use error::{CardError, CropWindow, PipelineWarning, Result};
pub use geometry::RotatedRect;
pub use output::{ArtifactKind, ArtifactWriter, DirectoryWriter, ImageIdentity};
pub use pipeline::{
    load_image, CardDetection, CardPipeline, DebugArtifacts, ImageReport, PipelineResult,
};
pub use transform::{NormalizedCrop, Normalizer};
pub use trim::{TrimmedCrop, WhitespaceTrimmer};
