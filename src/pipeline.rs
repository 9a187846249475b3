use std::collections::HashSet;
use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::backend::{GeometryBackend, ImageprocBackend};
use crate::config::PipelineConfig;
use crate::contours::{ContourExtractor, Contour};
use crate::detection::{RectangleCandidate, RectangleFilter, RejectionCounts};
use crate::edges::{EdgeMapBuilder, EdgeMaps};
use crate::error::{CardError, PipelineWarning, Result};
use crate::output::{ArtifactKind, ArtifactWriter, ImageIdentity};
use crate::overlay::{draw_contours, draw_rectangles};
use crate::transform::{NormalizedCrop, Normalizer};
use crate::trim::{TrimmedCrop, WhitespaceTrimmer};

/// One card carried through every stage.
#[derive(Debug, Clone)]
pub struct CardDetection {
    pub candidate: RectangleCandidate,
    pub crop: NormalizedCrop,
    pub trimmed: TrimmedCrop,
}

impl CardDetection {
    pub fn rank(&self) -> usize {
        self.candidate.rank
    }
}

/// Intermediate rasters of one accepted candidate.
#[derive(Debug, Clone)]
pub struct CandidateDebug {
    pub rank: usize,
    pub rotated: Option<DynamicImage>,
    pub crop: Option<DynamicImage>,
}

/// Everything drawn for inspection when `draw_contours` is set.
#[derive(Debug, Clone)]
pub struct DebugArtifacts {
    pub edge_maps: EdgeMaps,
    pub contours: Vec<Contour>,
    pub contour_overlay: RgbImage,
    pub rectangle_overlay: RgbImage,
    pub candidates: Vec<CandidateDebug>,
}

/// Outcome of running the pipeline on one image.
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    /// Ordered by rank.
    pub detections: Vec<CardDetection>,
    pub rejected: RejectionCounts,
    pub polygons_considered: usize,
    pub warnings: Vec<PipelineWarning>,
    pub debug: Option<DebugArtifacts>,
}

impl PipelineResult {
    fn warn(&mut self, warning: PipelineWarning) {
        warn!(%warning, "Pipeline warning");
        self.warnings.push(warning);
    }
}

/// What happened to one input file.
#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub input: PathBuf,
    pub subdir: String,
    pub accepted: usize,
    pub rejected: RejectionCounts,
    pub warnings: Vec<String>,
    pub written: Vec<PathBuf>,
    pub write_errors: Vec<String>,
}

/// Load an input image; directories and other non-files are refused.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    if !path.is_file() {
        return Err(CardError::NotAFile(path.to_path_buf()));
    }
    image::open(path).map_err(|source| CardError::Load {
        path: path.to_path_buf(),
        source,
    })
}

/// Detects, deskews, crops and trims every card in a photo.
pub struct CardPipeline<B = ImageprocBackend> {
    config: PipelineConfig,
    backend: B,
    edges: EdgeMapBuilder,
    contours: ContourExtractor,
    filter: RectangleFilter,
    normalizer: Normalizer,
    trimmer: WhitespaceTrimmer,
}

impl CardPipeline<ImageprocBackend> {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_backend(config, ImageprocBackend)
    }
}

impl<B: GeometryBackend> CardPipeline<B> {
    /// Validate `config` once and build every stage from it.
    pub fn with_backend(config: PipelineConfig, backend: B) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            edges: EdgeMapBuilder::new(config.edges.clone()),
            contours: ContourExtractor::new(config.contours.clone()),
            filter: RectangleFilter::new(&config),
            normalizer: Normalizer::new(config.normalize.clone()),
            trimmer: WhitespaceTrimmer::new(config.trim.clone()),
            config,
            backend,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn process_image(&self, image: &DynamicImage) -> PipelineResult {
        let mut result = PipelineResult::default();
        if image.width() == 0 || image.height() == 0 {
            result.warn(PipelineWarning::NoRectanglesFound { polygons: 0 });
            return result;
        }

        let draw = self.config.draw_contours;
        let maps = self.edges.build(image);
        let extraction = self.contours.extract(&self.backend, &maps.dilated);
        let outcome = self.filter.filter(&extraction);
        result.polygons_considered = extraction.polygons.len();
        result.rejected = outcome.rejected;

        if outcome.accepted.is_empty() {
            result.warn(PipelineWarning::NoRectanglesFound {
                polygons: extraction.polygons.len(),
            });
        }

        let mut candidates_debug = Vec::new();
        for candidate in &outcome.accepted {
            let normalization = self.normalizer.normalize(&self.backend, image, candidate, draw);
            for warning in normalization.warnings {
                result.warn(warning);
            }
            if draw {
                candidates_debug.push(CandidateDebug {
                    rank: candidate.rank,
                    rotated: normalization.rotated,
                    crop: normalization.crop.as_ref().map(|c| c.image.clone()),
                });
            }

            let Some(crop) = normalization.crop else {
                continue;
            };
            let (trimmed, warning) = self.trimmer.trim(&crop);
            if let Some(warning) = warning {
                result.warn(warning);
            }
            result.detections.push(CardDetection {
                candidate: candidate.clone(),
                crop,
                trimmed,
            });
        }

        if draw {
            result.debug = Some(DebugArtifacts {
                contour_overlay: draw_contours(image, &extraction.contours),
                rectangle_overlay: draw_rectangles(image, &outcome.accepted),
                contours: extraction.contours,
                edge_maps: maps,
                candidates: candidates_debug,
            });
        }

        info!(
            accepted = result.detections.len(),
            rejected = result.rejected.total(),
            warnings = result.warnings.len(),
            "Image processed"
        );
        result
    }

    /// Load, process and persist one input.
    ///
    /// Write failures are collected in the report; artifacts already written stay.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn process_path<W: ArtifactWriter + ?Sized>(
        &self,
        path: &Path,
        writer: &W,
    ) -> Result<ImageReport> {
        let image = load_image(path)?;
        let identity = ImageIdentity::from_path(path);
        let result = self.process_image(&image);
        let (written, write_errors) = persist(&identity, &result, writer);

        Ok(ImageReport {
            input: path.to_path_buf(),
            subdir: identity.subdir,
            accepted: result.detections.len(),
            rejected: result.rejected,
            warnings: result.warnings.iter().map(ToString::to_string).collect(),
            written,
            write_errors: write_errors.iter().map(ToString::to_string).collect(),
        })
    }

    /// Load one input, trim its border and write it whole as `<stem>_trimmed.<ext>`.
    ///
    /// No detection runs; the report counts the input as one kept image.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn trim_path<W: ArtifactWriter + ?Sized>(
        &self,
        path: &Path,
        writer: &W,
    ) -> Result<ImageReport> {
        let image = load_image(path)?;
        let identity = ImageIdentity::from_path(path);
        let (trimmed, warning) = self.trimmer.trim_image(&image, 1);

        let mut warnings = Vec::new();
        if let Some(warning) = warning {
            warn!(%warning, "Pipeline warning");
            warnings.push(warning.to_string());
        }

        let (mut written, mut write_errors) = (Vec::new(), Vec::new());
        match writer.write(&identity, &ArtifactKind::TrimmedInput, &trimmed.image) {
            Ok(output) => written.push(output),
            Err(e) => {
                warn!(error = %e, "Artifact not written");
                write_errors.push(e.to_string());
            }
        }
        info!(bounds = %trimmed.bounds, "Image trimmed");

        Ok(ImageReport {
            input: path.to_path_buf(),
            subdir: identity.subdir,
            accepted: 1,
            rejected: RejectionCounts::default(),
            warnings,
            written,
            write_errors,
        })
    }

    /// Process many inputs in parallel; one failing input never stops the others.
    pub fn run_batch<W: ArtifactWriter + ?Sized>(
        &self,
        inputs: &[PathBuf],
        writer: &W,
    ) -> Vec<(PathBuf, Result<ImageReport>)> {
        for_each_input(inputs, |path| self.process_path(path, writer))
    }

    /// [`CardPipeline::trim_path`] over many inputs in parallel.
    pub fn trim_batch<W: ArtifactWriter + ?Sized>(
        &self,
        inputs: &[PathBuf],
        writer: &W,
    ) -> Vec<(PathBuf, Result<ImageReport>)> {
        for_each_input(inputs, |path| self.trim_path(path, writer))
    }
}

/// Run `job` once per distinct input, in input order.
///
/// Inputs are compared as given, the same key the output subdirectory is
/// derived from, so no two workers ever write the same files.
fn for_each_input<F>(inputs: &[PathBuf], job: F) -> Vec<(PathBuf, Result<ImageReport>)>
where
    F: Fn(&Path) -> Result<ImageReport> + Sync,
{
    let mut seen = HashSet::new();
    let unique: Vec<&PathBuf> = inputs.iter().filter(|path| seen.insert(*path)).collect();
    if unique.len() < inputs.len() {
        debug!(skipped = inputs.len() - unique.len(), "Duplicate inputs skipped");
    }

    unique
        .into_par_iter()
        .map(|path| {
            let report = job(path.as_path());
            if let Err(ref e) = report {
                warn!(path = %path.display(), error = %e, "Input failed");
            }
            (path.clone(), report)
        })
        .collect()
}

/// Write every artifact of a result; failures do not stop later writes.
pub fn persist<W: ArtifactWriter + ?Sized>(
    identity: &ImageIdentity,
    result: &PipelineResult,
    writer: &W,
) -> (Vec<PathBuf>, Vec<CardError>) {
    let mut written = Vec::new();
    let mut errors = Vec::new();
    let mut save = |kind: ArtifactKind, image: &DynamicImage| {
        match writer.write(identity, &kind, image) {
            Ok(path) => written.push(path),
            Err(e) => {
                warn!(error = %e, "Artifact not written");
                errors.push(e);
            }
        }
    };

    for detection in &result.detections {
        save(ArtifactKind::Cropped { rank: detection.rank() }, &detection.crop.image);
        save(ArtifactKind::Trimmed { rank: detection.rank() }, &detection.trimmed.image);
    }

    if let Some(debug) = &result.debug {
        let maps = &debug.edge_maps;
        let stages = [
            ("grayscale", &maps.grayscale),
            ("blurred", &maps.blurred),
            ("edges", &maps.edges),
            ("dilated", &maps.dilated),
        ];
        for (i, (name, raster)) in stages.into_iter().enumerate() {
            save(
                ArtifactKind::Stage { index: i + 1, name },
                &DynamicImage::ImageLuma8(raster.clone()),
            );
        }
        save(
            ArtifactKind::ContourOverlay,
            &DynamicImage::ImageRgb8(debug.contour_overlay.clone()),
        );
        save(
            ArtifactKind::RectangleOverlay,
            &DynamicImage::ImageRgb8(debug.rectangle_overlay.clone()),
        );
        for candidate in &debug.candidates {
            if let Some(rotated) = &candidate.rotated {
                save(ArtifactKind::CandidateRotated { rank: candidate.rank }, rotated);
            }
            if let Some(crop) = &candidate.crop {
                save(ArtifactKind::CandidateCrop { rank: candidate.rank }, crop);
            }
        }
    }

    (written, errors)
}
