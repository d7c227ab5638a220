//! In-process block compression with Intel's ISPC texture compressor.

use super::{EncodeError, EncodeSettings, TextureEncoder, pad_to_blocks};
use crate::registry::Format;
use image::RgbaImage;
use intel_tex_2::{RgbaSurface, bc1, bc3, etc1};

pub const TOOL_NAME: &str = "ispc";

#[derive(Debug, Default)]
pub struct IspcEncoder;

impl TextureEncoder for IspcEncoder {
    fn version(&self) -> String {
        "intel_tex_2 0.5".to_string()
    }

    fn encode(
        &self,
        level: &RgbaImage,
        format: &Format,
        _settings: &EncodeSettings,
    ) -> Result<Vec<u8>, EncodeError> {
        // ISPC kernels work on whole 4×4 blocks only.
        let padded = pad_to_blocks(level, 4, 4);
        let (width, height) = padded.dimensions();
        let surface = RgbaSurface {
            data: padded.as_raw(),
            width,
            height,
            stride: width * 4,
        };
        match format.name.as_str() {
            "DXT1" => Ok(bc1::compress_blocks(&surface)),
            "DXT5" => Ok(bc3::compress_blocks(&surface)),
            "ETC1" => Ok(etc1::compress_blocks(&etc1::slow_settings(), &surface)),
            other => Err(EncodeError::Unsupported {
                tool: TOOL_NAME.to_string(),
                format: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::registry::Registry;
    use image::Rgba;

    fn registry() -> Registry {
        builtin::registry().unwrap()
    }

    #[test]
    fn dxt1_payload_matches_block_geometry() {
        let reg = registry();
        let format = reg.find_format("DXT1").unwrap();
        let img = RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]));
        let out = IspcEncoder
            .encode(&img, format, &EncodeSettings::default())
            .unwrap();
        assert_eq!(out.len() as u64, format.block.level_payload(8, 8));
    }

    #[test]
    fn tiny_levels_are_padded_to_one_block() {
        let reg = registry();
        let format = reg.find_format("DXT5").unwrap();
        let img = RgbaImage::from_pixel(1, 1, Rgba([0, 255, 0, 128]));
        let out = IspcEncoder
            .encode(&img, format, &EncodeSettings::default())
            .unwrap();
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn etc1_payload_matches_block_geometry() {
        let reg = registry();
        let format = reg.find_format("ETC1").unwrap();
        let img = RgbaImage::from_pixel(6, 6, Rgba([10, 20, 30, 255]));
        let out = IspcEncoder
            .encode(&img, format, &EncodeSettings::default())
            .unwrap();
        assert_eq!(out.len() as u64, format.block.level_payload(6, 6));
    }

    #[test]
    fn unsupported_format_is_an_error() {
        let reg = registry();
        let format = reg.find_format("DXT3").unwrap();
        let img = RgbaImage::new(4, 4);
        let err = IspcEncoder
            .encode(&img, format, &EncodeSettings::default())
            .unwrap_err();
        assert!(matches!(err, EncodeError::Unsupported { .. }));
    }
}
