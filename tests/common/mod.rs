#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;

pub use cardcrop::geometry::{Point2, RotatedRect};
pub use cardcrop::{CardPipeline, PipelineConfig, PipelineResult};

pub const BACKGROUND: Rgb<u8> = Rgb([28, 32, 36]);
pub const CARD: Rgb<u8> = Rgb([232, 226, 214]);

/// Plain canvas in the background colour.
pub fn canvas(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, BACKGROUND)
}

/// Fill a card of `width` x `height` pixels centred on `center`, rotated by `angle` degrees.
pub fn draw_card(img: &mut RgbImage, center: (f64, f64), width: f64, height: f64, angle: f64) {
    // Corners bound the outermost pixel centres, so a w-pixel card spans w - 1
    let rect = RotatedRect {
        center: Point2::new(center.0, center.1),
        width: width - 1.0,
        height: height - 1.0,
        angle,
    };
    let corners: Vec<Point<i32>> = rect
        .corners()
        .iter()
        .map(|p| Point::new(p.x.round() as i32, p.y.round() as i32))
        .collect();
    draw_polygon_mut(img, &corners, CARD);
}

/// Axis-aligned card with its top-left pixel at (x, y).
pub fn draw_axis_card(img: &mut RgbImage, x: u32, y: u32, width: u32, height: u32) {
    for py in y..y + height {
        for px in x..x + width {
            img.put_pixel(px, py, CARD);
        }
    }
}

pub fn pipeline(min_area: f64, max_rectangles: usize) -> CardPipeline {
    let config = PipelineConfig {
        min_area,
        max_rectangles,
        ..PipelineConfig::default()
    };
    CardPipeline::new(config).expect("valid config")
}

pub fn run(img: RgbImage, min_area: f64, max_rectangles: usize) -> PipelineResult {
    pipeline(min_area, max_rectangles).process_image(&DynamicImage::ImageRgb8(img))
}

pub fn assert_close(actual: f64, expected: f64, tolerance: f64, what: &str) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "{}: expected {} +/- {}, got {}",
        what,
        expected,
        tolerance,
        actual
    );
}
