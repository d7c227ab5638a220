//! Texture containers: the file framing around encoded levels.
//!
//! A container knows how to recognise its files from a short content prefix,
//! how to describe the texture inside an existing file (so the resolver can map
//! it back to a registered format), and how to write a header. Level framing is
//! shared: every level is preceded by `mip_header_size` bytes and its payload
//! padded to `mip_data_padding`, the same parameters the
//! [layout calculator](crate::layout) uses, so a written file is always
//! `header_len + compressed_size` bytes.
//!
//! | Container | Header | Per-level header | Padding | Sniffed prefix |
//! |---|---|---|---|---|
//! | DDS | 128 bytes | 0 | 0 | `"DDS "` |
//! | KTX 1.1 | 64 bytes + key/value data | 4 (`imageSize`) | 4 | 12-byte identifier |

pub mod dds;
pub mod ktx;

use crate::registry::{Container, Format, FourCC, GlTriple};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("File too short: need {needed} bytes, have {got}")]
    Truncated { needed: usize, got: usize },
    #[error("Not a {0} file")]
    BadMagic(&'static str),
    #[error("Unsupported {container} content: {reason}")]
    Unsupported {
        container: &'static str,
        reason: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a stored texture names its format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKey {
    FourCC { fourcc: FourCC, alpha: bool },
    Gl(GlTriple),
}

/// What a container says about the texture it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub key: FormatKey,
    pub width: u32,
    pub height: u32,
    pub levels: u32,
}

/// Writer identification stamped into the reserved area of a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub word1: [u8; 4],
    pub word2: [u8; 4],
    pub version: u32,
}

impl Signature {
    /// Compatible with the GIMP DDS plugin, which reads its own stamp back.
    pub const GIMP: Signature = Signature {
        word1: *b"GIMP",
        word2: *b"-DDS",
        version: 131585,
    };

    pub fn texforge() -> Signature {
        let major: u32 = env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0);
        let minor: u32 = env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0);
        Signature {
            word1: *b"TXFG",
            word2: *b"ORGE",
            version: (major << 16) | minor,
        }
    }
}

/// Everything a header writer needs.
#[derive(Debug, Clone, Copy)]
pub struct TextureHeader<'a> {
    pub format: &'a Format,
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    /// Stamped where the container has room for it.
    pub signature: Option<Signature>,
}

/// Content-handling capability of a container.
pub trait ContainerFormat: Send + Sync {
    /// Runs once after the container is registered.
    fn init(&self) {}

    /// Does `prefix` (at least the container's `scan_bytes` long) belong to
    /// this container?
    fn matches(&self, prefix: &[u8]) -> bool;

    fn read_descriptor(&self, bytes: &[u8]) -> Result<TextureDescriptor, ContainerError>;

    /// Size of the header [`write_header`](Self::write_header) produces.
    fn header_len(&self) -> usize;

    /// Header size of an existing file, which may carry more than a written
    /// one (KTX key/value data).
    fn stored_header_len(&self, _bytes: &[u8]) -> Result<usize, ContainerError> {
        Ok(self.header_len())
    }

    fn write_header(
        &self,
        header: &TextureHeader<'_>,
        out: &mut Vec<u8>,
    ) -> Result<(), ContainerError>;

    /// Write the per-level prefix for a payload of `payload_len` bytes.
    fn write_level_header(&self, _payload_len: u64, _out: &mut Vec<u8>) {}
}

/// Frame encoded `levels` (base first) into a complete file.
pub fn assemble(
    container: &Container,
    header: &TextureHeader<'_>,
    levels: &[Vec<u8>],
) -> Result<Vec<u8>, ContainerError> {
    let handler = container.handler();
    let mut out = Vec::with_capacity(
        handler.header_len() + levels.iter().map(|l| l.len() + 8).sum::<usize>(),
    );
    handler.write_header(header, &mut out)?;
    for payload in levels {
        let start = out.len();
        handler.write_level_header(payload.len() as u64, &mut out);
        debug_assert_eq!((out.len() - start) as u64, container.mip_header_size);
        out.extend_from_slice(payload);
        if container.mip_data_padding > 0 {
            let pad = (payload.len() as u64).next_multiple_of(container.mip_data_padding)
                - payload.len() as u64;
            out.resize(out.len() + pad as usize, 0);
        }
    }
    Ok(out)
}

/// Largest width or height accepted from a stored header.
pub const MAX_DIMENSION: u32 = 1 << 16;
/// A full chain for [`MAX_DIMENSION`] has 17 levels; 32 leaves headroom.
const MAX_LEVELS: u32 = 32;

/// Reject header dimensions no real texture has, before they reach size
/// arithmetic.
pub(crate) fn check_extent(
    container: &'static str,
    width: u32,
    height: u32,
    levels: u32,
) -> Result<(), ContainerError> {
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ContainerError::Unsupported {
            container,
            reason: format!("dimensions {width}x{height}"),
        });
    }
    if levels > MAX_LEVELS {
        return Err(ContainerError::Unsupported {
            container,
            reason: format!("{levels} mip levels"),
        });
    }
    Ok(())
}

pub(crate) fn read_u32_le(bytes: &[u8], offset: usize) -> Result<u32, ContainerError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(ContainerError::Truncated {
            needed: offset + 4,
            got: bytes.len(),
        })
}

pub(crate) fn put_u32_le(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
