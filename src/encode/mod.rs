//! Texture encoders: the pixel-to-block half of a tool.
//!
//! A [`TextureEncoder`] turns one RGBA8 level into the raw payload of a
//! registered [`Format`]. Containers add headers afterwards, so encoders never
//! see DDS/KTX framing (external tools that insist on writing a file have their
//! payload extracted again, see [`external`]).
//!
//! | Tool | Encoder | Formats |
//! |---|---|---|
//! | `ispc` | [`IspcEncoder`] (`intel_tex_2`) | DXT1, DXT5, ETC1 |
//! | `nvtt` | [`ExternalEncoder`] (`nvcompress`) | DXT1, DXT1A, DXT3, DXT5 |
//! | `etc2comp` | [`ExternalEncoder`] (`EtcTool`) | ETC2 RGB / RGBA / RGBA1 |
//! | `pvrtextool` | [`ExternalEncoder`] (`PVRTexToolCLI`) | PVRTC 2/4 bpp |
//! | `raw` | [`RawEncoder`] | BGRA, BGR |

pub mod external;
pub mod ispc;
pub mod raw;

use crate::container::ContainerError;
use crate::registry::Format;
use clap::ValueEnum;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use external::{ExternalEncoder, ExternalTool};
pub use ispc::IspcEncoder;
pub use raw::RawEncoder;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("{tool} cannot encode {format}")]
    Unsupported { tool: String, format: String },
    #[error("{tool} is not available: {reason}")]
    ToolMissing { tool: String, reason: String },
    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unreadable tool output: {0}")]
    Output(#[from] ContainerError),
}

/// Speed / quality trade-off passed to every encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Fast,
    #[default]
    Regular,
    Hq,
}

impl Profile {
    pub fn name(self) -> &'static str {
        match self {
            Profile::Fast => "fast",
            Profile::Regular => "regular",
            Profile::Hq => "hq",
        }
    }
}

/// Error metric hint for encoders that support one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMetric {
    #[default]
    Auto,
    Uniform,
    Perceptual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeSettings {
    pub profile: Profile,
    pub metric: ErrorMetric,
}

/// Encoder capability of a tool.
pub trait TextureEncoder: Send + Sync {
    /// Runs once after the tool is registered.
    fn init(&self) {}

    /// Human-readable version, shown by `texforge list`.
    fn version(&self) -> String;

    /// Encode a single level into the payload of `format`.
    fn encode(
        &self,
        level: &RgbaImage,
        format: &Format,
        settings: &EncodeSettings,
    ) -> Result<Vec<u8>, EncodeError>;
}

/// Copy `image` onto a canvas whose sides are multiples of the block size,
/// replicating the last row and column into the padding.
pub fn pad_to_blocks(image: &RgbaImage, block_width: u32, block_height: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    let pw = w.div_ceil(block_width).max(1) * block_width;
    let ph = h.div_ceil(block_height).max(1) * block_height;
    if (pw, ph) == (w, h) {
        return image.clone();
    }
    RgbaImage::from_fn(pw, ph, |x, y| {
        *image.get_pixel(x.min(w.saturating_sub(1)), y.min(h.saturating_sub(1)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn pad_keeps_aligned_images() {
        let img = RgbaImage::from_pixel(8, 4, Rgba([1, 2, 3, 4]));
        assert_eq!(pad_to_blocks(&img, 4, 4).dimensions(), (8, 4));
    }

    #[test]
    fn pad_replicates_edges() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([9, 9, 9, 255]));
        let padded = pad_to_blocks(&img, 4, 4);
        assert_eq!(padded.dimensions(), (4, 4));
        assert_eq!(*padded.get_pixel(3, 3), Rgba([9, 9, 9, 255]));
        assert_eq!(*padded.get_pixel(0, 3), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn profile_names() {
        assert_eq!(Profile::Fast.name(), "fast");
        assert_eq!(Profile::default(), Profile::Regular);
    }
}
