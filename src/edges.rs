use image::{DynamicImage, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;
use tracing::{debug, instrument};

use crate::config::EdgeConfig;

/// Pixels less opaque than this are treated as background.
const ALPHA_THRESHOLD: u8 = 10;

/// Every intermediate raster of the edge stage, all the size of the source.
#[derive(Debug, Clone)]
pub struct EdgeMaps {
    pub grayscale: GrayImage,
    pub blurred: GrayImage,
    pub edges: GrayImage,
    pub dilated: GrayImage,
}

/// Turns a photo into a binary map of thickened edges.
#[derive(Debug, Clone)]
pub struct EdgeMapBuilder {
    config: EdgeConfig,
}

impl EdgeMapBuilder {
    pub fn new(config: EdgeConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn build(&self, image: &DynamicImage) -> EdgeMaps {
        let grayscale = to_grayscale(image);
        let blurred = gaussian_blur_f32(&grayscale, self.config.blur_sigma);
        let edges = canny(&blurred, self.config.canny_low, self.config.canny_high);

        // One L-inf step of radius k equals k passes of a 3x3 square kernel
        let dilated = if self.config.dilate_iterations == 0 {
            edges.clone()
        } else {
            dilate(&edges, Norm::LInf, self.config.dilate_iterations)
        };

        debug!(
            edge_pixels = count_set(&edges),
            dilated_pixels = count_set(&dilated),
            "Edge map built"
        );

        EdgeMaps {
            grayscale,
            blurred,
            edges,
            dilated,
        }
    }
}

/// Convert to grayscale with fixed BT.601 weights; transparent pixels become white
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = image {
        return gray.clone();
    }

    let rgba = image.to_rgba8();
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let pixel = rgba.get_pixel(x, y);
        if pixel[3] < ALPHA_THRESHOLD {
            return Luma([255]);
        }
        let luma = 0.299 * f64::from(pixel[0])
            + 0.587 * f64::from(pixel[1])
            + 0.114 * f64::from(pixel[2]);
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

fn count_set(img: &GrayImage) -> usize {
    img.pixels().filter(|p| p[0] > 0).count()
}
