use imageproc::point::Point;
use nalgebra::{Matrix3, Vector3};

/// A point in raster coordinates; pixel centres sit on integers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<Point<i32>> for Point2 {
    fn from(p: Point<i32>) -> Self {
        Self::new(f64::from(p.x), f64::from(p.y))
    }
}

/// A rectangle at an arbitrary rotation.
///
/// `angle` is the direction of the `width` side in degrees, measured from
/// the +x axis towards +y (clockwise on screen), always within [-45, 45].
/// At exactly ±45° the longer side is reported as `width`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: Point2,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl RotatedRect {
    /// Build a rectangle and bring its angle into the canonical range.
    pub fn new(center: Point2, width: f64, height: f64, angle: f64) -> Self {
        let (angle, width, height) = normalize_angle(angle, width, height);
        Self {
            center,
            width,
            height,
            angle,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn longer_side(&self) -> f64 {
        self.width.max(self.height)
    }

    pub fn shorter_side(&self) -> f64 {
        self.width.min(self.height)
    }

    /// `short side / long side`, in (0, 1].
    pub fn aspect(&self) -> f64 {
        if self.longer_side() <= 0.0 {
            return 0.0;
        }
        self.shorter_side() / self.longer_side()
    }

    /// Corners in order: top-left, top-right, bottom-right, bottom-left of the
    /// rectangle's own frame.
    pub fn corners(&self) -> [Point2; 4] {
        let (sin, cos) = self.angle.to_radians().sin_cos();
        let (hw, hh) = (self.width / 2.0, self.height / 2.0);
        [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)].map(|(u, v)| {
            Point2::new(
                self.center.x + u * cos - v * sin,
                self.center.y + u * sin + v * cos,
            )
        })
    }

    /// Shrink every side by the footprint a square structuring element of
    /// half-size `inset` leaves on an edge at this rectangle's angle.
    pub fn inset_by_square(&self, inset: f64) -> RotatedRect {
        let (sin, cos) = self.angle.to_radians().sin_cos();
        let per_side = inset * (cos.abs() + sin.abs());
        RotatedRect {
            center: self.center,
            width: (self.width - 2.0 * per_side).max(1.0),
            height: (self.height - 2.0 * per_side).max(1.0),
            angle: self.angle,
        }
    }
}

/// Fold an angle into [-45, 45], swapping the sides for every quarter turn.
pub fn normalize_angle(angle: f64, width: f64, height: f64) -> (f64, f64, f64) {
    let mut angle = angle % 180.0;
    let (mut width, mut height) = (width, height);

    while angle > 45.0 {
        angle -= 90.0;
        std::mem::swap(&mut width, &mut height);
    }
    while angle < -45.0 {
        angle += 90.0;
        std::mem::swap(&mut width, &mut height);
    }

    // A ±45° rectangle reads either way; keep the longer side as width.
    if (angle.abs() - 45.0).abs() < 1e-9 && width < height {
        angle = if angle > 0.0 { angle - 90.0 } else { angle + 90.0 };
        std::mem::swap(&mut width, &mut height);
    }

    (angle, width, height)
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point2]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x * b.y - b.x * a.y)
        .sum();
    twice.abs() / 2.0
}

/// Minimum-area enclosing rectangle of a point set.
///
/// Rotating calipers over the convex hull: every hull edge is tried as the
/// base of the rectangle. Returns `None` when the points are collinear.
pub fn min_area_rect(points: &[Point<i32>]) -> Option<RotatedRect> {
    if points.len() < 3 {
        return None;
    }

    let hull: Vec<Point2> = imageproc::geometry::convex_hull(points)
        .into_iter()
        .map(Point2::from)
        .collect();
    if hull.len() < 3 || polygon_area(&hull) <= f64::EPSILON {
        return None;
    }

    let mut best: Option<(f64, RotatedRect)> = None;
    for (i, p1) in hull.iter().enumerate() {
        let p2 = hull[(i + 1) % hull.len()];
        let (ex, ey) = (p2.x - p1.x, p2.y - p1.y);
        let len = ex.hypot(ey);
        if len < 1e-9 {
            continue;
        }

        // Unit vectors along and across the edge
        let (ux, uy) = (ex / len, ey / len);
        let (vx, vy) = (-uy, ux);

        let mut min_u = f64::INFINITY;
        let mut max_u = f64::NEG_INFINITY;
        let mut min_v = f64::INFINITY;
        let mut max_v = f64::NEG_INFINITY;
        for p in &hull {
            let (dx, dy) = (p.x - p1.x, p.y - p1.y);
            let u = dx * ux + dy * uy;
            let v = dx * vx + dy * vy;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if best.as_ref().map_or(true, |(best_area, _)| area < *best_area) {
            let cu = (min_u + max_u) / 2.0;
            let cv = (min_v + max_v) / 2.0;
            let center = Point2::new(p1.x + cu * ux + cv * vx, p1.y + cu * uy + cv * vy);
            let rect = RotatedRect::new(
                center,
                max_u - min_u,
                max_v - min_v,
                uy.atan2(ux).to_degrees(),
            );
            best = Some((area, rect));
        }
    }

    best.map(|(_, rect)| rect)
}

fn orientation(a: Point2, b: Point2, c: Point2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn segments_cross(a: Point2, b: Point2, c: Point2, d: Point2) -> bool {
    let d1 = orientation(c, d, a);
    let d2 = orientation(c, d, b);
    let d3 = orientation(a, b, c);
    let d4 = orientation(a, b, d);
    (d1 > 0.0) != (d2 > 0.0) && (d3 > 0.0) != (d4 > 0.0) && d1 != 0.0 && d2 != 0.0
}

/// True if no two non-adjacent edges of the closed polygon cross.
pub fn is_simple_polygon(points: &[Point2]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    for i in 0..n {
        let (a, b) = (points[i], points[(i + 1) % n]);
        for j in (i + 2)..n {
            // Skip the edge sharing a vertex with edge i across the wrap
            if i == 0 && j == n - 1 {
                continue;
            }
            let (c, d) = (points[j], points[(j + 1) % n]);
            if segments_cross(a, b, c, d) {
                return false;
            }
        }
    }
    polygon_area(points) > 0.0
}

/// Affine matrix rotating the plane by `angle_degrees` about `center`.
pub fn rotation_about(center: Point2, angle_degrees: f64) -> Matrix3<f64> {
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    let (cx, cy) = (center.x, center.y);

    // Translate to origin, rotate, translate back
    let translate_to_origin = Matrix3::new(
        1.0, 0.0, -cx,
        0.0, 1.0, -cy,
        0.0, 0.0, 1.0,
    );

    let rotate = Matrix3::new(
        cos, -sin, 0.0,
        sin, cos, 0.0,
        0.0, 0.0, 1.0,
    );

    let translate_back = Matrix3::new(
        1.0, 0.0, cx,
        0.0, 1.0, cy,
        0.0, 0.0, 1.0,
    );

    translate_back * rotate * translate_to_origin
}

/// Transform a point using the affine matrix
pub fn transform_point(matrix: &Matrix3<f64>, p: Point2) -> Point2 {
    let v = matrix * Vector3::new(p.x, p.y, 1.0);
    Point2::new(v.x / v.z, v.y / v.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_points(cx: f64, cy: f64, w: f64, h: f64, angle: f64) -> Vec<Point<i32>> {
        let (sin, cos) = angle.to_radians().sin_cos();
        let mut points = Vec::new();
        let steps = 200;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            for (u, v) in [
                (-w / 2.0 + t * w, -h / 2.0),
                (-w / 2.0 + t * w, h / 2.0),
                (-w / 2.0, -h / 2.0 + t * h),
                (w / 2.0, -h / 2.0 + t * h),
            ] {
                let x = cx + u * cos - v * sin;
                let y = cy + u * sin + v * cos;
                points.push(Point::new(x.round() as i32, y.round() as i32));
            }
        }
        points
    }

    #[test]
    fn test_normalize_angle() {
        let (angle, w, h) = normalize_angle(90.0, 100.0, 40.0);
        assert!(angle.abs() < 1e-9);
        assert_eq!((w, h), (40.0, 100.0));

        let (angle, w, h) = normalize_angle(-75.0, 600.0, 400.0);
        assert!((angle - 15.0).abs() < 1e-9);
        assert_eq!((w, h), (400.0, 600.0));

        let (angle, w, h) = normalize_angle(180.0, 10.0, 20.0);
        assert!(angle.abs() < 1e-9);
        assert_eq!((w, h), (10.0, 20.0));

        // Ambiguous diagonal keeps the longer side as width
        let (angle, w, h) = normalize_angle(45.0, 10.0, 20.0);
        assert!((angle + 45.0).abs() < 1e-9);
        assert_eq!((w, h), (20.0, 10.0));
    }

    #[test]
    fn test_polygon_area() {
        let square = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        assert!((polygon_area(&square) - 100.0).abs() < 1e-9);
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }

    #[test]
    fn test_min_area_rect_axis_aligned() {
        let points = rect_points(50.0, 80.0, 40.0, 60.0, 0.0);
        let rect = min_area_rect(&points).unwrap();
        assert!(rect.angle.abs() < 1e-6);
        assert!((rect.width - 40.0).abs() < 1e-6);
        assert!((rect.height - 60.0).abs() < 1e-6);
        assert!((rect.center.x - 50.0).abs() < 1e-6);
        assert!((rect.center.y - 80.0).abs() < 1e-6);
    }

    #[test]
    fn test_min_area_rect_rotated() {
        let points = rect_points(300.0, 300.0, 200.0, 120.0, 20.0);
        let rect = min_area_rect(&points).unwrap();
        assert!((rect.angle - 20.0).abs() < 0.5, "angle {}", rect.angle);
        assert!((rect.width - 200.0).abs() < 2.0);
        assert!((rect.height - 120.0).abs() < 2.0);

        let points = rect_points(300.0, 300.0, 200.0, 120.0, -10.0);
        let rect = min_area_rect(&points).unwrap();
        assert!((rect.angle + 10.0).abs() < 0.5, "angle {}", rect.angle);
    }

    #[test]
    fn test_min_area_rect_collinear() {
        let points: Vec<Point<i32>> = (0..10).map(|i| Point::new(i, 2 * i)).collect();
        assert!(min_area_rect(&points).is_none());
    }

    #[test]
    fn test_corners_round_trip() {
        let rect = RotatedRect::new(Point2::new(10.0, 20.0), 8.0, 4.0, 30.0);
        let corners = rect.corners();
        let d01 = (corners[1].x - corners[0].x).hypot(corners[1].y - corners[0].y);
        let d12 = (corners[2].x - corners[1].x).hypot(corners[2].y - corners[1].y);
        assert!((d01 - 8.0).abs() < 1e-9);
        assert!((d12 - 4.0).abs() < 1e-9);
        assert!((polygon_area(&corners) - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_inset_by_square() {
        let rect = RotatedRect::new(Point2::new(0.0, 0.0), 105.0, 55.0, 0.0);
        let inset = rect.inset_by_square(2.5);
        assert!((inset.width - 100.0).abs() < 1e-9);
        assert!((inset.height - 50.0).abs() < 1e-9);

        let tiny = RotatedRect::new(Point2::new(0.0, 0.0), 3.0, 3.0, 0.0).inset_by_square(5.0);
        assert_eq!((tiny.width, tiny.height), (1.0, 1.0));
    }

    #[test]
    fn test_is_simple_polygon() {
        let quad = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        assert!(is_simple_polygon(&quad));

        let bowtie = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(10.0, 0.0),
            Point2::new(0.0, 10.0),
        ];
        assert!(!is_simple_polygon(&bowtie));
    }

    #[test]
    fn test_rotation_about_center() {
        let center = Point2::new(50.0, 50.0);
        let matrix = rotation_about(center, 90.0);

        // Center stays fixed
        let c = transform_point(&matrix, center);
        assert!((c.x - 50.0).abs() < 1e-9 && (c.y - 50.0).abs() < 1e-9);

        // +x direction turns into +y
        let p = transform_point(&matrix, Point2::new(60.0, 50.0));
        assert!((p.x - 50.0).abs() < 1e-9);
        assert!((p.y - 60.0).abs() < 1e-9);
    }
}
