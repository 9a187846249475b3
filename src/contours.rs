use image::GrayImage;
use imageproc::point::Point;
use tracing::{debug, instrument};

use crate::backend::GeometryBackend;
use crate::config::ContourConfig;
use crate::geometry::{polygon_area, Point2};

/// Outer boundary of one connected edge component.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    /// Position in tracer (raster-scan) order among all outer contours.
    pub index: usize,
    pub points: Vec<Point<i32>>,
}

/// Axis-aligned bounds, inclusive of the last pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn of(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        })
    }
}

/// A simplified contour on its way to becoming a rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonCandidate {
    pub vertices: Vec<Point<i32>>,
    /// Shoelace area enclosed by the traced contour.
    pub area: f64,
    pub bbox: BoundingBox,
    /// Index of the [`Contour`] this polygon came from.
    pub contour_index: usize,
}

/// Contours and the polygons that survived the length filter.
///
/// `contours[i].index == i` always holds.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub contours: Vec<Contour>,
    pub polygons: Vec<PolygonCandidate>,
}

impl Extraction {
    pub fn contour(&self, index: usize) -> Option<&Contour> {
        self.contours.get(index)
    }
}

#[derive(Debug, Clone)]
pub struct ContourExtractor {
    config: ContourConfig,
}

impl ContourExtractor {
    pub fn new(config: ContourConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all)]
    pub fn extract<B: GeometryBackend + ?Sized>(
        &self,
        backend: &B,
        edges: &GrayImage,
    ) -> Extraction {
        let contours: Vec<Contour> = backend
            .outer_contours(edges)
            .into_iter()
            .enumerate()
            .map(|(index, points)| Contour { index, points })
            .collect();

        let mut polygons = Vec::new();
        for contour in &contours {
            let perimeter = backend.closed_length(&contour.points);
            if perimeter < self.config.min_contour_length {
                continue;
            }
            let Some(bbox) = BoundingBox::of(&contour.points) else {
                continue;
            };

            let epsilon = self.config.approx_epsilon_ratio * perimeter;
            polygons.push(PolygonCandidate {
                vertices: backend.simplify(&contour.points, epsilon),
                area: contour_area(&contour.points),
                bbox,
                contour_index: contour.index,
            });
        }

        debug!(
            contours = contours.len(),
            polygons = polygons.len(),
            "Contours extracted"
        );

        Extraction { contours, polygons }
    }
}

/// Area enclosed by a traced contour.
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    let points: Vec<Point2> = points.iter().copied().map(Point2::from).collect();
    polygon_area(&points)
}
