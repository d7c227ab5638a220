//! Shared test utilities for the texforge test suite.
//!
//! Provides synthetic image fixtures, a deterministic mock encoder and
//! container, and registries wired with them.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! let (registry, calls) = mock_registry(MockEncoder::default());
//! // ... run the pipeline over tmp.path() ...
//! assert_eq!(calls.lock().unwrap().len(), 3);
//! ```

use image::{Rgba, RgbaImage};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::block::BLOCK_BGRA;
use crate::container::{ContainerError, ContainerFormat, TextureDescriptor, TextureHeader};
use crate::encode::{EncodeError, EncodeSettings, TextureEncoder};
use crate::imaging::ImageTraits;
use crate::registry::{
    CodecDef, CodecPolicy, ContainerDef, Features, Format, FormatDef, FourCC, GlTriple, Registry,
    ToolDef,
};

// =========================================================================
// Image fixtures
// =========================================================================

/// Write a `width × height` PNG whose pixels all carry `alpha`.
///
/// Colour varies with position so encoders see real content.
pub fn write_test_png(path: &Path, width: u32, height: u32, alpha: u8) {
    write_png_with(path, width, height, |x, y| {
        Rgba([(x * 40) as u8, (y * 40) as u8, 128, alpha])
    });
}

/// Write a PNG with pixels from `f(x, y)`, creating parent directories.
pub fn write_png_with(path: &Path, width: u32, height: u32, f: impl Fn(u32, u32) -> Rgba<u8>) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    RgbaImage::from_fn(width, height, f).save(path).unwrap();
}

/// A small texture tree in a temp directory:
///
/// ```text
/// textures/wall.png    8×8 opaque
/// textures/glass.png   8×8 alpha 128
/// gfx/menu/title.png   6×3 opaque (not power of two)
/// readme.txt           ignored by the scanner
/// ```
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_test_png(&root.join("textures/wall.png"), 8, 8, 255);
    write_test_png(&root.join("textures/glass.png"), 8, 8, 128);
    write_test_png(&root.join("gfx/menu/title.png"), 6, 3, 255);
    std::fs::write(root.join("readme.txt"), "not a texture").unwrap();
    tmp
}

// =========================================================================
// Mock plugins
// =========================================================================

/// Always picks the first enabled format.
pub struct PickFirst;

impl CodecPolicy for PickFirst {
    fn select_format<'a>(&self, _image: &ImageTraits, formats: &[&'a Format]) -> Option<&'a Format> {
        formats.first().copied()
    }
}

/// One recorded encode call: level dimensions and format name.
pub type EncodeCall = (u32, u32, String);

/// Encoder producing payloads of exactly the format's level size.
///
/// Calls are recorded behind a Mutex (the encoder is shared by rayon
/// workers). Levels whose first pixel has red == `fail_red` fail.
#[derive(Default, Clone)]
pub struct MockEncoder {
    pub calls: Arc<Mutex<Vec<EncodeCall>>>,
    pub fail_red: Option<u8>,
}

impl MockEncoder {
    pub fn failing_on_red(red: u8) -> Self {
        Self {
            fail_red: Some(red),
            ..Self::default()
        }
    }
}

impl TextureEncoder for MockEncoder {
    fn version(&self) -> String {
        "mock 1.0".to_string()
    }

    fn encode(
        &self,
        level: &RgbaImage,
        format: &Format,
        _settings: &EncodeSettings,
    ) -> Result<Vec<u8>, EncodeError> {
        let (w, h) = level.dimensions();
        self.calls
            .lock()
            .unwrap()
            .push((w, h, format.name.clone()));
        if let Some(red) = self.fail_red
            && level.get_pixel(0, 0)[0] == red
        {
            return Err(EncodeError::ToolFailed {
                tool: "mock".into(),
                message: "refused".into(),
            });
        }
        let size = format.block.level_payload(w, h) as usize;
        Ok((0..size).map(|i| (i % 251) as u8).collect())
    }
}

/// Container that claims files starting with `magic` and writes no header.
pub struct MockContainer {
    magic: &'static [u8],
}

impl MockContainer {
    pub fn def(name: &str, extension: &str, magic: &'static [u8]) -> ContainerDef {
        ContainerDef {
            name: name.to_string(),
            full_name: format!("{name} test container"),
            extension: extension.to_string(),
            scan_bytes: magic.len(),
            mip_header_size: 0,
            mip_data_padding: 0,
            handler: Box::new(MockContainer { magic }),
        }
    }
}

impl ContainerFormat for MockContainer {
    fn matches(&self, prefix: &[u8]) -> bool {
        prefix.starts_with(self.magic)
    }

    fn read_descriptor(&self, _bytes: &[u8]) -> Result<TextureDescriptor, ContainerError> {
        Err(ContainerError::Unsupported {
            container: "mock",
            reason: "descriptor".into(),
        })
    }

    fn header_len(&self) -> usize {
        0
    }

    fn write_header(
        &self,
        _header: &TextureHeader<'_>,
        _out: &mut Vec<u8>,
    ) -> Result<(), ContainerError> {
        Ok(())
    }
}

/// Builtin registry plus a `MOCK` codec (`-mock`) whose single tool is `encoder`.
///
/// The mock format `M32` is four bytes per pixel, so output sizes are easy to
/// predict. Returns the encoder's call log.
pub fn mock_registry(encoder: MockEncoder) -> (Registry, Arc<Mutex<Vec<EncodeCall>>>) {
    let calls = Arc::clone(&encoder.calls);
    let mut registry = crate::builtin::registry().unwrap();
    let codec = registry.register_codec(CodecDef {
        name: "MOCK".into(),
        full_name: "Mock codec".into(),
        parm_name: "mock".into(),
        policy: Box::new(BgraLike),
    });
    let tool = registry.register_tool(
        ToolDef {
            name: "mocktool".into(),
            full_name: "Mock tool".into(),
            parm_name: "mocktool".into(),
            encoder: Box::new(encoder),
        },
        codec,
    );
    registry.register_format(
        FormatDef {
            name: "M32".into(),
            full_name: "Mock 32-bit".into(),
            parm_name: "m32".into(),
            codec,
            fourcc: FourCC::from_bytes(b"MK32"),
            gl: Some(GlTriple {
                format: 0x80E1,
                internal_format: 0x8058,
                element_type: 0x1401,
            }),
            features: Features::ALPHA,
            block: BLOCK_BGRA,
        },
        tool,
    );
    registry.assign_fallback(crate::builtin::FALLBACK_CODEC).unwrap();
    (registry, calls)
}

/// Accepts opaque images only, so alpha inputs exercise the fallback path.
struct BgraLike;

impl CodecPolicy for BgraLike {
    fn select_format<'a>(&self, image: &ImageTraits, formats: &[&'a Format]) -> Option<&'a Format> {
        if image.has_alpha {
            return None;
        }
        formats.first().copied()
    }
}

