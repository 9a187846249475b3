use std::borrow::Cow;

use image::DynamicImage;
use tracing::{debug, instrument};

use crate::backend::{to_8bit_layout, GeometryBackend};
use crate::config::{NormalizeConfig, Orientation};
use crate::detection::RectangleCandidate;
use crate::error::{CropWindow, PipelineWarning};
use crate::geometry::{rotation_about, RotatedRect};

/// A deskewed, cropped card in canonical orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCrop {
    pub rank: usize,
    /// Rotation that was undone, in degrees.
    pub angle: f64,
    pub image: DynamicImage,
    /// The crop was turned 90° clockwise to reach the requested orientation.
    pub quarter_turned: bool,
    /// Window that was cut out of the (rotated) source.
    pub window: CropWindow,
}

/// Outcome of normalizing one candidate.
#[derive(Debug, Clone, Default)]
pub struct Normalization {
    /// `None` when the crop window missed the image entirely.
    pub crop: Option<NormalizedCrop>,
    /// The full deskewed source, kept only on request.
    pub rotated: Option<DynamicImage>,
    pub warnings: Vec<PipelineWarning>,
}

/// Rotates, crops and orients each accepted rectangle.
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizeConfig,
}

impl Normalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(rank = candidate.rank, angle = candidate.rect.angle))]
    pub fn normalize<B: GeometryBackend + ?Sized>(
        &self,
        backend: &B,
        image: &DynamicImage,
        candidate: &RectangleCandidate,
        keep_rotated: bool,
    ) -> Normalization {
        let rank = candidate.rank;
        let rect = candidate.rect;
        let source = to_8bit_layout(image);
        let mut warnings = Vec::new();

        let mut angle = rect.angle;
        let frame: Cow<'_, DynamicImage> = if angle.abs() <= self.config.axis_epsilon_deg {
            angle = 0.0;
            source
        } else {
            // Undo the card's rotation about its own centre
            let matrix = rotation_about(rect.center, -angle);
            match backend.warp(&source, &matrix, self.config.resampling) {
                Some(rotated) => Cow::Owned(rotated),
                None => {
                    warnings.push(PipelineWarning::RotationUnavailable { rank });
                    angle = 0.0;
                    source
                }
            }
        };

        let requested = crop_window(&rect);
        let Some(window) = clamp_window(requested, frame.width(), frame.height()) else {
            warnings.push(PipelineWarning::EmptyCrop { rank, requested });
            return Normalization {
                crop: None,
                rotated: keep_rotated.then(|| frame.into_owned()),
                warnings,
            };
        };
        if window != requested {
            warnings.push(PipelineWarning::CropClamped {
                rank,
                requested,
                clamped: window,
            });
        }

        let cropped = frame.crop_imm(
            window.x as u32,
            window.y as u32,
            window.width,
            window.height,
        );

        let quarter_turned = needs_quarter_turn(self.config.orientation, &rect);
        let image = if quarter_turned {
            cropped.rotate90()
        } else {
            cropped
        };

        debug!(
            %window,
            quarter_turned,
            width = image.width(),
            height = image.height(),
            "Card normalized"
        );

        Normalization {
            crop: Some(NormalizedCrop {
                rank,
                angle,
                image,
                quarter_turned,
                window,
            }),
            rotated: keep_rotated.then(|| frame.into_owned()),
            warnings,
        }
    }
}

/// Pixel window covering an upright rectangle centred on `rect.center`.
pub fn crop_window(rect: &RotatedRect) -> CropWindow {
    CropWindow {
        x: (rect.center.x - rect.width / 2.0 + 0.5).round() as i64,
        y: (rect.center.y - rect.height / 2.0 + 0.5).round() as i64,
        width: rect.width.round().max(1.0) as u32,
        height: rect.height.round().max(1.0) as u32,
    }
}

/// Intersect a window with the raster; `None` when nothing is left.
pub fn clamp_window(window: CropWindow, width: u32, height: u32) -> Option<CropWindow> {
    let x0 = window.x.max(0);
    let y0 = window.y.max(0);
    let x1 = (window.x + i64::from(window.width)).min(i64::from(width));
    let y1 = (window.y + i64::from(window.height)).min(i64::from(height));
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(CropWindow {
        x: x0,
        y: y0,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    })
}

fn needs_quarter_turn(orientation: Orientation, rect: &RotatedRect) -> bool {
    match orientation {
        Orientation::Portrait => rect.width > rect.height,
        Orientation::Landscape => rect.height > rect.width,
        Orientation::AsDetected => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ImageprocBackend;
    use crate::contours::{BoundingBox, PolygonCandidate};
    use crate::detection::Acceptance;
    use crate::geometry::Point2;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn candidate(rect: RotatedRect) -> RectangleCandidate {
        RectangleCandidate {
            polygon: PolygonCandidate {
                vertices: Vec::new(),
                area: rect.area(),
                bbox: BoundingBox { x: 0, y: 0, width: 1, height: 1 },
                contour_index: 0,
            },
            rect,
            rank: 1,
            acceptance: Acceptance::Quadrilateral,
        }
    }

    fn card_image() -> DynamicImage {
        let mut img = RgbImage::from_pixel(200, 160, Rgb([0, 0, 0]));
        for y in 40..100 {
            for x in 50..90 {
                img.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_crop_window_rounding() {
        let rect = RotatedRect::new(Point2::new(69.5, 69.5), 40.0, 60.0, 0.0);
        assert_eq!(
            crop_window(&rect),
            CropWindow { x: 50, y: 40, width: 40, height: 60 }
        );
    }

    #[test]
    fn test_clamp_window() {
        let window = CropWindow { x: -5, y: 10, width: 20, height: 20 };
        assert_eq!(
            clamp_window(window, 100, 25),
            Some(CropWindow { x: 0, y: 10, width: 15, height: 15 })
        );
        let outside = CropWindow { x: 120, y: 0, width: 10, height: 10 };
        assert_eq!(clamp_window(outside, 100, 100), None);
    }

    #[test]
    fn test_axis_aligned_crop_is_exact() {
        let rect = RotatedRect::new(Point2::new(69.5, 69.5), 40.0, 60.0, 0.2);
        let result = Normalizer::new(NormalizeConfig::default()).normalize(
            &ImageprocBackend,
            &card_image(),
            &candidate(rect),
            false,
        );
        assert!(result.warnings.is_empty());
        let crop = result.crop.unwrap();
        assert_eq!((crop.image.width(), crop.image.height()), (40, 60));
        assert!(!crop.quarter_turned);
        assert_eq!(crop.angle, 0.0);
        assert!(crop.image.to_rgb8().pixels().all(|p| p[0] == 250));
    }

    #[test]
    fn test_orientation_policies() {
        let landscape = RotatedRect::new(Point2::new(69.5, 69.5), 60.0, 40.0, 0.0);
        let portrait = Normalizer::new(NormalizeConfig::default())
            .normalize(&ImageprocBackend, &card_image(), &candidate(landscape), false)
            .crop
            .unwrap();
        assert!(portrait.quarter_turned);
        assert_eq!((portrait.image.width(), portrait.image.height()), (40, 60));

        let config = NormalizeConfig {
            orientation: Orientation::AsDetected,
            ..NormalizeConfig::default()
        };
        let kept = Normalizer::new(config)
            .normalize(&ImageprocBackend, &card_image(), &candidate(landscape), false)
            .crop
            .unwrap();
        assert!(!kept.quarter_turned);
        assert_eq!((kept.image.width(), kept.image.height()), (60, 40));
    }

    #[test]
    fn test_clamped_and_empty_windows() {
        let normalizer = Normalizer::new(NormalizeConfig::default());
        let edge = RotatedRect::new(Point2::new(5.0, 80.0), 40.0, 60.0, 0.0);
        let result =
            normalizer.normalize(&ImageprocBackend, &card_image(), &candidate(edge), false);
        assert!(matches!(
            result.warnings.as_slice(),
            [PipelineWarning::CropClamped { rank: 1, .. }]
        ));
        assert!(result.crop.is_some());

        let outside = RotatedRect::new(Point2::new(500.0, 500.0), 40.0, 60.0, 0.0);
        let result =
            normalizer.normalize(&ImageprocBackend, &card_image(), &candidate(outside), true);
        assert!(result.crop.is_none());
        assert!(result.rotated.is_some());
        assert!(matches!(
            result.warnings.as_slice(),
            [PipelineWarning::EmptyCrop { rank: 1, .. }]
        ));
    }

    #[test]
    fn test_rotated_crop_keeps_channels() {
        let img =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(120, 120, Rgba([10, 200, 10, 255])));
        let rect = RotatedRect::new(Point2::new(60.0, 60.0), 30.0, 50.0, 12.0);
        let result = Normalizer::new(NormalizeConfig::default()).normalize(
            &ImageprocBackend,
            &img,
            &candidate(rect),
            true,
        );
        let crop = result.crop.unwrap();
        assert!(matches!(crop.image, DynamicImage::ImageRgba8(_)));
        assert_eq!((crop.image.width(), crop.image.height()), (30, 50));
        assert!((crop.angle - 12.0).abs() < 1e-9);
        let rotated = result.rotated.unwrap();
        assert_eq!((rotated.width(), rotated.height()), (120, 120));
    }
}
