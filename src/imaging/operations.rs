//! High-level image preparation.
//!
//! Turns a decoded RGBA image into the list of levels an encoder consumes:
//! optional upscale passes, power-of-two resize, alpha analysis and the mip
//! chain, in that order.

use super::analysis::{ImageTraits, analyze};
use super::calculations::{is_power_of_two, mip_dimensions, power_of_two_dimensions};
use super::params::{PrepareOptions, Scaler};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

/// A decoded image ready for encoding.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Dimensions as decoded, before any scaling.
    pub source_dimensions: (u32, u32),
    /// Traits of the base level after scaling.
    pub traits: ImageTraits,
    /// Base level first, then each mip level.
    pub levels: Vec<RgbaImage>,
}

impl PreparedImage {
    pub fn base(&self) -> &RgbaImage {
        &self.levels[0]
    }

    pub fn dimensions(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.levels.iter().map(|l| l.dimensions())
    }
}

pub fn prepare(image: RgbaImage, options: &PrepareOptions) -> PreparedImage {
    let source_dimensions = image.dimensions();

    let mut image = image;
    for scaler in &options.scale_passes {
        image = upscale(&image, *scaler);
    }

    let (w, h) = image.dimensions();
    if options.power_of_two && !is_power_of_two(w, h) {
        let (pw, ph) = power_of_two_dimensions(w, h);
        image = imageops::resize(&image, pw, ph, FilterType::Lanczos3);
    }

    let traits = analyze(&image, &options.alpha);

    let mut levels = Vec::new();
    if options.mipmaps {
        let (w, h) = image.dimensions();
        let mut previous = image.clone();
        for (mw, mh) in mip_dimensions(w, h) {
            let next = imageops::resize(&previous, mw, mh, FilterType::Triangle);
            levels.push(std::mem::replace(&mut previous, next));
        }
        levels.push(previous);
    } else {
        levels.push(image);
    }

    PreparedImage {
        source_dimensions,
        traits,
        levels,
    }
}

/// Double both axes with `scaler`.
pub fn upscale(image: &RgbaImage, scaler: Scaler) -> RgbaImage {
    let (w, h) = image.dimensions();
    let filter = match scaler {
        Scaler::Scale2x => return scale2x(image),
        Scaler::Super2x => {
            let four = scale2x(&scale2x(image));
            return imageops::resize(&four, w * 2, h * 2, FilterType::Triangle);
        }
        Scaler::Nearest => FilterType::Nearest,
        Scaler::Bilinear => FilterType::Triangle,
        Scaler::Bicubic | Scaler::Catmullrom => FilterType::CatmullRom,
        Scaler::Bspline => FilterType::Gaussian,
        Scaler::Lanczos => FilterType::Lanczos3,
    };
    imageops::resize(image, w * 2, h * 2, filter)
}

/// EPX / Scale2x: each pixel becomes a 2×2 block, copying an edge neighbour
/// into a corner where two neighbours agree and the opposite ones do not.
pub fn scale2x(image: &RgbaImage) -> RgbaImage {
    let (w, h) = image.dimensions();
    let mut out = RgbaImage::new(w * 2, h * 2);
    let at = |x: i64, y: i64| -> Rgba<u8> {
        let cx = x.clamp(0, w as i64 - 1) as u32;
        let cy = y.clamp(0, h as i64 - 1) as u32;
        *image.get_pixel(cx, cy)
    };
    for y in 0..h {
        for x in 0..w {
            let (xi, yi) = (x as i64, y as i64);
            let p = at(xi, yi);
            let a = at(xi, yi - 1);
            let b = at(xi + 1, yi);
            let c = at(xi - 1, yi);
            let d = at(xi, yi + 1);

            let tl = if c == a && c != d && a != b { a } else { p };
            let tr = if a == b && a != c && b != d { b } else { p };
            let bl = if d == c && d != b && c != a { c } else { p };
            let br = if b == d && b != a && d != c { d } else { p };

            out.put_pixel(x * 2, y * 2, tl);
            out.put_pixel(x * 2 + 1, y * 2, tr);
            out.put_pixel(x * 2, y * 2 + 1, bl);
            out.put_pixel(x * 2 + 1, y * 2 + 1, br);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, alpha: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([200, 100, 50, alpha]))
    }

    // =========================================================================
    // prepare
    // =========================================================================

    #[test]
    fn prepare_without_options_keeps_single_level() {
        let p = prepare(solid(5, 3, 255), &PrepareOptions::default());
        assert_eq!(p.levels.len(), 1);
        assert_eq!(p.base().dimensions(), (5, 3));
        assert_eq!(p.source_dimensions, (5, 3));
        assert!(!p.traits.has_alpha);
    }

    #[test]
    fn prepare_resizes_to_power_of_two() {
        let opts = PrepareOptions {
            power_of_two: true,
            ..PrepareOptions::default()
        };
        let p = prepare(solid(5, 3, 255), &opts);
        assert_eq!(p.base().dimensions(), (8, 4));
        assert_eq!((p.traits.width, p.traits.height), (8, 4));
        assert_eq!(p.source_dimensions, (5, 3));
    }

    #[test]
    fn prepare_builds_mip_chain_to_one_pixel() {
        let opts = PrepareOptions {
            mipmaps: true,
            ..PrepareOptions::default()
        };
        let p = prepare(solid(8, 4, 255), &opts);
        let dims: Vec<_> = p.dimensions().collect();
        assert_eq!(dims, vec![(8, 4), (4, 2), (2, 1), (1, 1)]);
    }

    #[test]
    fn prepare_applies_scale_passes_in_order() {
        let opts = PrepareOptions {
            scale_passes: vec![Scaler::Nearest, Scaler::Scale2x],
            ..PrepareOptions::default()
        };
        let p = prepare(solid(3, 2, 255), &opts);
        assert_eq!(p.base().dimensions(), (12, 8));
        assert_eq!(p.source_dimensions, (3, 2));
    }

    #[test]
    fn prepare_reports_alpha() {
        let opts = PrepareOptions {
            alpha: crate::imaging::AlphaDetection {
                binary: true,
                ..Default::default()
            },
            ..PrepareOptions::default()
        };
        let p = prepare(solid(2, 2, 0), &opts);
        assert!(p.traits.has_alpha);
        assert!(p.traits.binary_alpha);
    }

    // =========================================================================
    // scalers
    // =========================================================================

    #[test]
    fn every_scaler_doubles_dimensions() {
        for scaler in [
            Scaler::Nearest,
            Scaler::Bilinear,
            Scaler::Bicubic,
            Scaler::Bspline,
            Scaler::Catmullrom,
            Scaler::Lanczos,
            Scaler::Scale2x,
            Scaler::Super2x,
        ] {
            assert_eq!(upscale(&solid(3, 5, 255), scaler).dimensions(), (6, 10), "{scaler:?}");
        }
    }

    #[test]
    fn scale2x_of_flat_image_is_flat() {
        let out = scale2x(&solid(2, 2, 255));
        assert!(out.pixels().all(|p| *p == Rgba([200, 100, 50, 255])));
    }

    #[test]
    fn scale2x_rounds_diagonal_edge() {
        // B W
        // B B   top-right W pixel gets a black bottom-left corner
        let black = Rgba([0, 0, 0, 255]);
        let white = Rgba([255, 255, 255, 255]);
        let mut img = RgbaImage::from_pixel(2, 2, black);
        img.put_pixel(1, 0, white);
        let out = scale2x(&img);
        assert_eq!(*out.get_pixel(2, 1), black);
        assert_eq!(*out.get_pixel(3, 0), white);
    }
}
