//! Alpha-channel analysis.

use super::params::AlphaDetection;
use image::RgbaImage;

/// What format-selection policies know about an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTraits {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    /// Alpha is (almost) entirely fully transparent or fully opaque.
    pub binary_alpha: bool,
}

impl ImageTraits {
    pub fn is_square_power_of_two(&self) -> bool {
        self.width == self.height && self.width.is_power_of_two()
    }
}

/// Inspect the alpha channel of `image`.
///
/// `has_alpha` is set when any pixel is not fully opaque. `binary_alpha`
/// additionally requires detection to be enabled and the share of pixels at
/// the extremes (`<= min` or `>= max`) to reach `threshold` percent.
pub fn analyze(image: &RgbaImage, detection: &AlphaDetection) -> ImageTraits {
    let (width, height) = image.dimensions();
    let total = image.pixels().len();
    let mut translucent = 0usize;
    let mut extreme = 0usize;
    for p in image.pixels() {
        let a = p[3];
        if a < 255 {
            translucent += 1;
        }
        if a <= detection.min || a >= detection.max {
            extreme += 1;
        }
    }
    let has_alpha = translucent > 0;
    let binary_alpha = has_alpha
        && detection.binary
        && total > 0
        && extreme as f64 * 100.0 / total as f64 >= detection.threshold as f64;

    ImageTraits {
        width,
        height,
        has_alpha,
        binary_alpha,
    }
}
