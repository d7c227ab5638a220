//! Image decoding through the `image` crate.
//!
//! ## Crate mapping
//!
//! | Input | Decoder |
//! |---|---|
//! | PNG, JPEG, TGA, BMP, TIFF, WebP | `image` crate (pure Rust decoders) |
//! | DDS, KTX | not decoded; handled as pass-through by the scheduler |
//!
//! Every decoded image is normalised to RGBA8.

use image::{ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
}

/// Extensions whose decoders are compiled in.
const IMAGE_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("png", ImageFormat::Png),
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("tga", ImageFormat::Tga),
    ("bmp", ImageFormat::Bmp),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    IMAGE_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

pub fn is_decodable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            supported_input_extensions()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
}

/// Decode an image from disk into RGBA8.
pub fn load_rgba(path: &Path) -> Result<RgbaImage, DecodeError> {
    let image = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| DecodeError::Decode {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    Ok(image.into_rgba8())
}

/// Decode an in-memory image (e.g. read once for checksumming) into RGBA8.
pub fn decode_rgba(bytes: &[u8], name: &Path) -> Result<RgbaImage, DecodeError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    // TGA has no magic number; fall back to the extension.
    let reader = match (reader.format(), ImageFormat::from_path(name)) {
        (None, Ok(format)) => {
            let mut r = ImageReader::new(Cursor::new(bytes));
            r.set_format(format);
            r
        }
        _ => reader,
    };
    let image = reader.decode().map_err(|e| DecodeError::Decode {
        path: name.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(image.into_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_test_png;
    use tempfile::TempDir;

    #[test]
    fn png_and_tga_are_supported() {
        let exts = supported_input_extensions();
        assert!(exts.contains(&"png"));
        assert!(exts.contains(&"tga"));
    }

    #[test]
    fn is_decodable_ignores_case() {
        assert!(is_decodable(Path::new("a/b/WALL.PNG")));
        assert!(!is_decodable(Path::new("a/b/wall.dds")));
        assert!(!is_decodable(Path::new("noext")));
    }

    #[test]
    fn load_png_as_rgba() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("t.png");
        write_test_png(&path, 6, 3, 128);
        let img = load_rgba(&path).unwrap();
        assert_eq!(img.dimensions(), (6, 3));
        assert_eq!(img.get_pixel(0, 0)[3], 128);
    }

    #[test]
    fn decode_from_memory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("t.png");
        write_test_png(&path, 2, 2, 255);
        let bytes = std::fs::read(&path).unwrap();
        let img = decode_rgba(&bytes, &path).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
    }

    #[test]
    fn garbage_fails_to_decode() {
        let err = decode_rgba(b"definitely not an image", Path::new("x.png")).unwrap_err();
        assert!(matches!(err, DecodeError::Decode { .. }));
    }
}
