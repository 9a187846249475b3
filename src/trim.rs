use image::{DynamicImage, Rgba, RgbaImage};
use tracing::{debug, instrument};

use crate::config::TrimConfig;
use crate::error::{CropWindow, PipelineWarning};
use crate::transform::NormalizedCrop;

/// A normalized crop with its uniform border removed.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedCrop {
    pub rank: usize,
    pub image: DynamicImage,
    /// Colour that was treated as background.
    pub background: Rgba<u8>,
    /// Kept region inside the normalized crop.
    pub bounds: CropWindow,
}

/// Removes near-uniform borders around a card.
#[derive(Debug, Clone)]
pub struct WhitespaceTrimmer {
    fuzz: f64,
}

impl WhitespaceTrimmer {
    pub fn new(config: TrimConfig) -> Self {
        Self { fuzz: config.fuzz }
    }

    /// Trim against the crop's top-left pixel.
    pub fn trim(&self, crop: &NormalizedCrop) -> (TrimmedCrop, Option<PipelineWarning>) {
        self.trim_image(&crop.image, crop.rank)
    }

    /// Trim any image against its top-left pixel.
    #[instrument(skip_all, fields(rank = rank))]
    pub fn trim_image(
        &self,
        image: &DynamicImage,
        rank: usize,
    ) -> (TrimmedCrop, Option<PipelineWarning>) {
        let rgba = image.to_rgba8();
        let background = rgba.get_pixel_checked(0, 0).copied().unwrap_or(Rgba([0, 0, 0, 0]));
        self.trim_against(image, &rgba, background, rank)
    }

    /// Trim an already trimmed crop again with the background it was trimmed against.
    ///
    /// The result equals the input.
    pub fn retrim(&self, trimmed: &TrimmedCrop) -> (TrimmedCrop, Option<PipelineWarning>) {
        let rgba = trimmed.image.to_rgba8();
        let (mut again, warning) =
            self.trim_against(&trimmed.image, &rgba, trimmed.background, trimmed.rank);
        again.bounds.x += trimmed.bounds.x;
        again.bounds.y += trimmed.bounds.y;
        (again, warning)
    }

    fn trim_against(
        &self,
        image: &DynamicImage,
        rgba: &RgbaImage,
        background: Rgba<u8>,
        rank: usize,
    ) -> (TrimmedCrop, Option<PipelineWarning>) {
        match content_bounds(rgba, background, self.fuzz) {
            Some(bounds) => {
                debug!(%bounds, "Border trimmed");
                let trimmed = image.crop_imm(
                    bounds.x as u32,
                    bounds.y as u32,
                    bounds.width,
                    bounds.height,
                );
                (
                    TrimmedCrop {
                        rank,
                        image: trimmed,
                        background,
                        bounds,
                    },
                    None,
                )
            }
            None => (
                TrimmedCrop {
                    rank,
                    image: image.clone(),
                    background,
                    bounds: CropWindow {
                        x: 0,
                        y: 0,
                        width: image.width(),
                        height: image.height(),
                    },
                },
                Some(PipelineWarning::DegenerateTrim { rank }),
            ),
        }
    }
}

/// Distance between two colours as a fraction of full scale.
///
/// RMS over the colour channels, or the alpha difference if that is larger.
pub fn color_distance(a: Rgba<u8>, b: Rgba<u8>) -> f64 {
    let squared: f64 = (0..3)
        .map(|c| {
            let d = f64::from(a[c]) - f64::from(b[c]);
            d * d
        })
        .sum();
    let rms = (squared / 3.0).sqrt() / 255.0;
    let alpha = (f64::from(a[3]) - f64::from(b[3])).abs() / 255.0;
    rms.max(alpha)
}

/// Bounding box of the pixels farther than `fuzz` from `background`.
pub fn content_bounds(img: &RgbaImage, background: Rgba<u8>, fuzz: f64) -> Option<CropWindow> {
    let (width, height) = img.dimensions();
    let mut min_x = width;
    let mut max_x = 0;
    let mut min_y = height;
    let mut max_y = 0;

    for (x, y, pixel) in img.enumerate_pixels() {
        if color_distance(*pixel, background) > fuzz {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }

    if min_x <= max_x && min_y <= max_y {
        Some(CropWindow {
            x: i64::from(min_x),
            y: i64::from(min_y),
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        })
    } else {
        None
    }
}
