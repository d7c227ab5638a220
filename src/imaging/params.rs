//! Parameter types for image preparation.
//!
//! These structs describe *what* to do to a decoded image before it reaches an
//! encoder; [`operations`](super::operations) does the pixel work.
//!
//! ## Types
//!
//! - [`Scaler`]: upscale filter for the optional 2x/4x passes.
//! - [`AlphaDetection`]: thresholds deciding when alpha counts as binary.
//! - [`PrepareOptions`]: the full recipe for one file: scale passes, power-of-two
//!   resize, mip generation and alpha analysis.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Upscale filter.
///
/// The resampling filters map onto `image::imageops::FilterType`; `scale2x`
/// and `super2x` are pixel-art scalers implemented in
/// [`operations`](super::operations).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Scaler {
    Nearest,
    Bilinear,
    Bicubic,
    Bspline,
    Catmullrom,
    Lanczos,
    Scale2x,
    #[default]
    Super2x,
}

impl Scaler {
    pub fn name(self) -> &'static str {
        match self {
            Scaler::Nearest => "nearest",
            Scaler::Bilinear => "bilinear",
            Scaler::Bicubic => "bicubic",
            Scaler::Bspline => "bspline",
            Scaler::Catmullrom => "catmullrom",
            Scaler::Lanczos => "lanczos",
            Scaler::Scale2x => "scale2x",
            Scaler::Super2x => "super2x",
        }
    }
}

/// Binary-alpha detection thresholds.
///
/// An image with alpha counts as *binary alpha* when at least `threshold`
/// percent of its pixels have alpha `<= min` or `>= max`. Formats with 1-bit
/// alpha are then preferred over full-alpha formats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlphaDetection {
    pub binary: bool,
    pub min: u8,
    pub max: u8,
    pub threshold: f32,
}

impl Default for AlphaDetection {
    fn default() -> Self {
        Self {
            binary: false,
            min: 0,
            max: 255,
            threshold: 99.0,
        }
    }
}

/// Everything [`prepare`](super::operations::prepare) needs for one file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrepareOptions {
    /// Upscale passes, applied in order; each doubles both axes.
    pub scale_passes: Vec<Scaler>,
    /// Resize each axis up to the next power of two.
    pub power_of_two: bool,
    /// Generate the full mip chain down to 1×1.
    pub mipmaps: bool,
    pub alpha: AlphaDetection,
}
