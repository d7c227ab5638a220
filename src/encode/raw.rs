//! Uncompressed BGRA / BGR output.

use super::{EncodeError, EncodeSettings, TextureEncoder};
use crate::registry::Format;
use image::RgbaImage;

pub const TOOL_NAME: &str = "raw";

#[derive(Debug, Default)]
pub struct RawEncoder;

impl TextureEncoder for RawEncoder {
    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn encode(
        &self,
        level: &RgbaImage,
        format: &Format,
        _settings: &EncodeSettings,
    ) -> Result<Vec<u8>, EncodeError> {
        let pixels = level.pixels();
        match format.name.as_str() {
            "BGRA" => Ok(pixels.flat_map(|p| [p[2], p[1], p[0], p[3]]).collect()),
            "BGR" => Ok(pixels.flat_map(|p| [p[2], p[1], p[0]]).collect()),
            other => Err(EncodeError::Unsupported {
                tool: TOOL_NAME.to_string(),
                format: other.to_string(),
            }),
        }
    }
}
