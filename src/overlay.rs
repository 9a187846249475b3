use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::contours::Contour;
use crate::detection::RectangleCandidate;

const CONTOUR_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const RECTANGLE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Stroke width that stays visible on large photos.
fn stroke_width(img: &RgbImage) -> i32 {
    (img.width().min(img.height()) / 400).max(1) as i32
}

/// Every traced contour in red on top of the source.
pub fn draw_contours(source: &DynamicImage, contours: &[Contour]) -> RgbImage {
    let mut canvas = source.to_rgb8();
    let half = stroke_width(&canvas) / 2;
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);

    for contour in contours {
        for p in &contour.points {
            for dy in -half..=half {
                for dx in -half..=half {
                    let (x, y) = (p.x + dx, p.y + dy);
                    if x >= 0 && y >= 0 && x < width && y < height {
                        canvas.put_pixel(x as u32, y as u32, CONTOUR_COLOR);
                    }
                }
            }
        }
    }
    canvas
}

/// Accepted rectangles only, in green on top of the source.
pub fn draw_rectangles(source: &DynamicImage, candidates: &[RectangleCandidate]) -> RgbImage {
    let mut canvas = source.to_rgb8();
    let half = stroke_width(&canvas) / 2;

    for candidate in candidates {
        let corners = candidate.rect.corners();
        for i in 0..corners.len() {
            let (a, b) = (corners[i], corners[(i + 1) % corners.len()]);
            for offset in -half..=half {
                let o = offset as f32;
                draw_line_segment_mut(
                    &mut canvas,
                    (a.x as f32 + o, a.y as f32 + o),
                    (b.x as f32 + o, b.y as f32 + o),
                    RECTANGLE_COLOR,
                );
            }
        }
    }
    canvas
}
