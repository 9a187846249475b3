use std::borrow::Cow;

use image::{DynamicImage, GrayImage, Luma, LumaA, Rgb, Rgba};
use imageproc::contours::find_contours;
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;
use nalgebra::Matrix3;

use crate::config::Resampling;

/// Bitmap and geometry primitives the pipeline relies on.
///
/// The detection stages only talk to this trait, so the thresholds,
/// ordering and angle conventions stay the same whichever engine sits
/// behind it.
pub trait GeometryBackend: Send + Sync {
    /// Borders of the top-level connected components, in tracer order.
    fn outer_contours(&self, edges: &GrayImage) -> Vec<Vec<Point<i32>>>;

    /// Perimeter of a closed contour.
    fn closed_length(&self, contour: &[Point<i32>]) -> f64;

    /// Douglas-Peucker simplification of a closed contour.
    fn simplify(&self, contour: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>>;

    /// Map `image` through the forward affine `matrix` onto a canvas of the
    /// same size, filling uncovered pixels with opaque black.
    ///
    /// Returns `None` when the matrix cannot be inverted.
    fn warp(
        &self,
        image: &DynamicImage,
        matrix: &Matrix3<f64>,
        resampling: Resampling,
    ) -> Option<DynamicImage>;
}

/// [`GeometryBackend`] on top of `imageproc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageprocBackend;

impl GeometryBackend for ImageprocBackend {
    fn outer_contours(&self, edges: &GrayImage) -> Vec<Vec<Point<i32>>> {
        // The tracer mislabels components starting in column 0, and their
        // holes then lose their parent. A background frame keeps nesting exact.
        let mut padded = GrayImage::new(edges.width() + 2, edges.height() + 2);
        image::imageops::replace(&mut padded, edges, 1, 1);

        find_contours::<i32>(&padded)
            .into_iter()
            .filter(|c| c.parent.is_none())
            .map(|c| {
                c.points
                    .into_iter()
                    .map(|p| Point::new(p.x - 1, p.y - 1))
                    .collect()
            })
            .collect()
    }

    fn closed_length(&self, contour: &[Point<i32>]) -> f64 {
        if contour.len() < 2 {
            return 0.0;
        }
        arc_length(contour, true)
    }

    fn simplify(&self, contour: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
        if contour.len() < 3 {
            return dedup_closed(contour.to_vec());
        }

        // Split the loop at the point farthest from the start and simplify
        // each open half; both halves keep their endpoints.
        let start = contour[0];
        let far = contour
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| squared_distance(start, **p))
            .map(|(i, _)| i)
            .unwrap_or(0);
        if far == 0 {
            return vec![start];
        }

        let mut polygon = approximate_polygon_dp(&contour[..=far], epsilon, false);

        let mut second: Vec<Point<i32>> = contour[far..].to_vec();
        second.push(start);
        let second = approximate_polygon_dp(&second, epsilon, false);
        polygon.extend(second.into_iter().skip(1));
        polygon.pop();

        drop_flat_vertices(dedup_closed(polygon), epsilon)
    }

    fn warp(
        &self,
        image: &DynamicImage,
        matrix: &Matrix3<f64>,
        resampling: Resampling,
    ) -> Option<DynamicImage> {
        matrix.try_inverse()?;
        let projection = to_projection(matrix)?;
        let interpolation = match resampling {
            Resampling::Nearest => Interpolation::Nearest,
            Resampling::Bilinear => Interpolation::Bilinear,
            Resampling::Bicubic => Interpolation::Bicubic,
        };

        let warped = match to_8bit_layout(image).as_ref() {
            DynamicImage::ImageLuma8(img) => {
                DynamicImage::ImageLuma8(warp(img, &projection, interpolation, Luma([0])))
            }
            DynamicImage::ImageLumaA8(img) => {
                DynamicImage::ImageLumaA8(warp(img, &projection, interpolation, LumaA([0, 255])))
            }
            DynamicImage::ImageRgb8(img) => {
                DynamicImage::ImageRgb8(warp(img, &projection, interpolation, Rgb([0, 0, 0])))
            }
            other => DynamicImage::ImageRgba8(warp(
                &other.to_rgba8(),
                &projection,
                interpolation,
                Rgba([0, 0, 0, 255]),
            )),
        };
        Some(warped)
    }
}

/// View any image in the 8-bit layout with the same channel count.
pub fn to_8bit_layout(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => Cow::Borrowed(image),
        other => Cow::Owned(match other.color().channel_count() {
            1 => DynamicImage::ImageLuma8(other.to_luma8()),
            2 => DynamicImage::ImageLumaA8(other.to_luma_alpha8()),
            3 => DynamicImage::ImageRgb8(other.to_rgb8()),
            _ => DynamicImage::ImageRgba8(other.to_rgba8()),
        }),
    }
}

fn to_projection(matrix: &Matrix3<f64>) -> Option<Projection> {
    let mut values = [0f32; 9];
    for row in 0..3 {
        for col in 0..3 {
            values[row * 3 + col] = matrix[(row, col)] as f32;
        }
    }
    Projection::from_matrix(values)
}

fn squared_distance(a: Point<i32>, b: Point<i32>) -> i64 {
    let dx = i64::from(a.x) - i64::from(b.x);
    let dy = i64::from(a.y) - i64::from(b.y);
    dx * dx + dy * dy
}

/// Remove consecutive duplicates, including a closing repeat of the first point.
fn dedup_closed(mut points: Vec<Point<i32>>) -> Vec<Point<i32>> {
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// Drop vertices lying within `epsilon` of the chord between their neighbours.
///
/// The split point of a closed loop is always kept by Douglas-Peucker even
/// when it sits in the middle of a straight run.
fn drop_flat_vertices(mut points: Vec<Point<i32>>, epsilon: f64) -> Vec<Point<i32>> {
    let mut i = 0;
    while points.len() > 3 && i < points.len() {
        let n = points.len();
        let prev = points[(i + n - 1) % n];
        let next = points[(i + 1) % n];
        if chord_distance(points[i], prev, next) < epsilon {
            points.remove(i);
            i = i.saturating_sub(1);
        } else {
            i += 1;
        }
    }
    points
}

fn chord_distance(p: Point<i32>, a: Point<i32>, b: Point<i32>) -> f64 {
    let (px, py) = (f64::from(p.x), f64::from(p.y));
    let (ax, ay) = (f64::from(a.x), f64::from(a.y));
    let (bx, by) = (f64::from(b.x), f64::from(b.y));
    let len = (bx - ax).hypot(by - ay);
    if len < f64::EPSILON {
        return (px - ax).hypot(py - ay);
    }
    ((bx - ax) * (ay - py) - (ax - px) * (by - ay)).abs() / len
}
