use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::config::{PipelineConfig, ShapeConfig};
use crate::contours::{Extraction, PolygonCandidate};
use crate::geometry::{is_simple_polygon, min_area_rect, Point2, RotatedRect};

/// Why a polygon was accepted as a card outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acceptance {
    /// Simplified to exactly four vertices forming a simple loop.
    Quadrilateral,
    /// Accepted through the relaxed extent/aspect fallback.
    RectangleLike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    TooSmall,
    Degenerate,
    NotQuadrilateral,
    SelfIntersecting,
    AspectOutOfRange,
    /// Beyond `max_rectangles` after ranking.
    Surplus,
}

/// Rejected polygons per reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RejectionCounts {
    pub too_small: usize,
    pub degenerate: usize,
    pub not_quadrilateral: usize,
    pub self_intersecting: usize,
    pub aspect_out_of_range: usize,
    pub surplus: usize,
}

impl RejectionCounts {
    pub fn record(&mut self, reason: RejectionReason) {
        let slot = match reason {
            RejectionReason::TooSmall => &mut self.too_small,
            RejectionReason::Degenerate => &mut self.degenerate,
            RejectionReason::NotQuadrilateral => &mut self.not_quadrilateral,
            RejectionReason::SelfIntersecting => &mut self.self_intersecting,
            RejectionReason::AspectOutOfRange => &mut self.aspect_out_of_range,
            RejectionReason::Surplus => &mut self.surplus,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.too_small
            + self.degenerate
            + self.not_quadrilateral
            + self.self_intersecting
            + self.aspect_out_of_range
            + self.surplus
    }
}

/// An accepted card outline.
#[derive(Debug, Clone, PartialEq)]
pub struct RectangleCandidate {
    pub polygon: PolygonCandidate,
    /// Minimum-area rectangle, compensated for the edge dilation.
    pub rect: RotatedRect,
    /// 1-based position by polygon area, largest first.
    pub rank: usize,
    pub acceptance: Acceptance,
}

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub accepted: Vec<RectangleCandidate>,
    pub rejected: RejectionCounts,
}

/// Selects and ranks the polygons that look like cards.
#[derive(Debug, Clone)]
pub struct RectangleFilter {
    max_rectangles: usize,
    min_area: f64,
    shape: ShapeConfig,
    edge_inset: f64,
}

impl RectangleFilter {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_rectangles: config.max_rectangles,
            min_area: config.min_area,
            shape: config.shape.clone(),
            edge_inset: config.edge_inset(),
        }
    }

    #[instrument(skip_all, fields(polygons = extraction.polygons.len()))]
    pub fn filter(&self, extraction: &Extraction) -> FilterOutcome {
        let mut rejected = RejectionCounts::default();
        let mut accepted = Vec::new();

        for polygon in &extraction.polygons {
            let Some(contour) = extraction.contour(polygon.contour_index) else {
                rejected.record(RejectionReason::Degenerate);
                continue;
            };
            match self.classify(polygon, &contour.points) {
                Ok((rect, acceptance)) => accepted.push(RectangleCandidate {
                    polygon: polygon.clone(),
                    rect,
                    rank: 0,
                    acceptance,
                }),
                Err(reason) => {
                    trace!(
                        contour = polygon.contour_index,
                        vertices = polygon.vertices.len(),
                        area = polygon.area,
                        ?reason,
                        "Polygon rejected"
                    );
                    rejected.record(reason);
                }
            }
        }

        // Stable: equal areas keep discovery order
        accepted.sort_by(|a, b| b.polygon.area.total_cmp(&a.polygon.area));
        if accepted.len() > self.max_rectangles {
            rejected.surplus += accepted.len() - self.max_rectangles;
            accepted.truncate(self.max_rectangles);
        }
        for (i, candidate) in accepted.iter_mut().enumerate() {
            candidate.rank = i + 1;
        }

        debug!(
            accepted = accepted.len(),
            rejected = rejected.total(),
            "Rectangles filtered"
        );

        FilterOutcome { accepted, rejected }
    }

    fn classify(
        &self,
        polygon: &PolygonCandidate,
        contour: &[imageproc::point::Point<i32>],
    ) -> Result<(RotatedRect, Acceptance), RejectionReason> {
        if polygon.area < self.min_area {
            return Err(RejectionReason::TooSmall);
        }

        let rect = min_area_rect(contour).ok_or(RejectionReason::Degenerate)?;

        let vertices: Vec<Point2> = polygon.vertices.iter().copied().map(Point2::from).collect();
        let acceptance = if vertices.len() == 4 {
            if !is_simple_polygon(&vertices) {
                return Err(RejectionReason::SelfIntersecting);
            }
            Acceptance::Quadrilateral
        } else {
            match self.shape.relaxed {
                Some(relaxed)
                    if rect.area() > 0.0
                        && polygon.area / rect.area() >= relaxed.min_extent
                        && rect.aspect() >= relaxed.min_aspect =>
                {
                    Acceptance::RectangleLike
                }
                _ => return Err(RejectionReason::NotQuadrilateral),
            }
        };

        let rect = rect.inset_by_square(self.edge_inset);

        if let Some(range) = self.shape.aspect_ratio {
            if !range.contains(rect.aspect()) {
                return Err(RejectionReason::AspectOutOfRange);
            }
        }

        Ok((rect, acceptance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AspectRange, RelaxedShape};
    use crate::contours::{BoundingBox, Contour};
    use imageproc::point::Point;

    fn rect_contour(x0: i32, y0: i32, w: i32, h: i32) -> Vec<Point<i32>> {
        let mut points = Vec::new();
        for x in x0..x0 + w {
            points.push(Point::new(x, y0));
        }
        for y in y0..y0 + h {
            points.push(Point::new(x0 + w, y));
        }
        for x in (x0 + 1..=x0 + w).rev() {
            points.push(Point::new(x, y0 + h));
        }
        for y in (y0 + 1..=y0 + h).rev() {
            points.push(Point::new(x0, y));
        }
        points
    }

    fn push_polygon(
        extraction: &mut Extraction,
        points: Vec<Point<i32>>,
        vertices: Vec<Point<i32>>,
    ) {
        let index = extraction.contours.len();
        let area = crate::contours::contour_area(&points);
        let bbox = BoundingBox::of(&points).unwrap();
        extraction.polygons.push(PolygonCandidate {
            vertices,
            area,
            bbox,
            contour_index: index,
        });
        extraction.contours.push(Contour { index, points });
    }

    fn push_rect(extraction: &mut Extraction, x0: i32, y0: i32, w: i32, h: i32) {
        let corners = vec![
            Point::new(x0, y0),
            Point::new(x0 + w, y0),
            Point::new(x0 + w, y0 + h),
            Point::new(x0, y0 + h),
        ];
        push_polygon(extraction, rect_contour(x0, y0, w, h), corners);
    }

    fn config(min_area: f64, max_rectangles: usize) -> PipelineConfig {
        PipelineConfig {
            min_area,
            max_rectangles,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_ranks_by_area_and_truncates() {
        let mut extraction = Extraction::default();
        push_rect(&mut extraction, 0, 0, 100, 50);
        push_rect(&mut extraction, 200, 0, 250, 200);
        push_rect(&mut extraction, 0, 300, 150, 150);

        let outcome = RectangleFilter::new(&config(1000.0, 2)).filter(&extraction);
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.accepted[0].polygon.contour_index, 1);
        assert_eq!(outcome.accepted[1].polygon.contour_index, 2);
        assert_eq!(
            outcome.accepted.iter().map(|c| c.rank).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(outcome.rejected.surplus, 1);
        assert_eq!(outcome.rejected.total(), 1);
    }

    #[test]
    fn test_equal_areas_keep_discovery_order() {
        let mut extraction = Extraction::default();
        push_rect(&mut extraction, 0, 0, 100, 100);
        push_rect(&mut extraction, 300, 0, 100, 100);
        let outcome = RectangleFilter::new(&config(10.0, 5)).filter(&extraction);
        assert_eq!(outcome.accepted[0].polygon.contour_index, 0);
        assert_eq!(outcome.accepted[1].polygon.contour_index, 1);
    }

    #[test]
    fn test_min_area_is_exclusive_lower_bound() {
        let mut extraction = Extraction::default();
        push_rect(&mut extraction, 0, 0, 100, 50);
        let outcome = RectangleFilter::new(&config(5000.0, 5)).filter(&extraction);
        assert_eq!(outcome.accepted.len(), 1);

        let outcome = RectangleFilter::new(&config(5000.5, 5)).filter(&extraction);
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.rejected.too_small, 1);
    }

    #[test]
    fn test_edge_inset_applied() {
        let mut extraction = Extraction::default();
        push_rect(&mut extraction, 10, 10, 405, 605);
        let outcome = RectangleFilter::new(&config(1000.0, 5)).filter(&extraction);
        let rect = outcome.accepted[0].rect;
        assert!((rect.width - 400.0).abs() < 1e-6);
        assert!((rect.height - 600.0).abs() < 1e-6);
        assert!((rect.center.x - 212.5).abs() < 1e-6);
    }

    #[test]
    fn test_self_intersecting_quad_rejected() {
        let mut extraction = Extraction::default();
        let bowtie = vec![
            Point::new(0, 0),
            Point::new(100, 100),
            Point::new(100, 0),
            Point::new(0, 100),
        ];
        push_polygon(&mut extraction, rect_contour(0, 0, 100, 100), bowtie);
        let outcome = RectangleFilter::new(&config(100.0, 5)).filter(&extraction);
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.rejected.self_intersecting, 1);
    }

    #[test]
    fn test_relaxed_fallback_needs_configuration() {
        let mut extraction = Extraction::default();
        let pentagon = vec![
            Point::new(0, 0),
            Point::new(50, 0),
            Point::new(100, 2),
            Point::new(100, 100),
            Point::new(0, 100),
        ];
        push_polygon(&mut extraction, rect_contour(0, 0, 100, 100), pentagon);

        let outcome = RectangleFilter::new(&config(100.0, 5)).filter(&extraction);
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.rejected.not_quadrilateral, 1);

        let mut relaxed = config(100.0, 5);
        relaxed.shape.relaxed = Some(RelaxedShape {
            min_extent: 0.9,
            min_aspect: 0.5,
        });
        let outcome = RectangleFilter::new(&relaxed).filter(&extraction);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].acceptance, Acceptance::RectangleLike);
    }

    #[test]
    fn test_aspect_gate() {
        let mut extraction = Extraction::default();
        push_rect(&mut extraction, 0, 0, 305, 425);
        push_rect(&mut extraction, 500, 0, 505, 205);

        let mut gated = config(1000.0, 5);
        gated.shape.aspect_ratio = Some(AspectRange::new(0.69, 0.74));
        let outcome = RectangleFilter::new(&gated).filter(&extraction);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].polygon.contour_index, 0);
        assert_eq!(outcome.rejected.aspect_out_of_range, 1);
    }
}
